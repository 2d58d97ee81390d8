//! Fixed key material shared by the unit tests of this crate.

use bitcoin::secp256k1::{Keypair, Secp256k1, SecretKey};
use bitcoin::XOnlyPublicKey;
use sha2::{Digest, Sha256};

pub fn secret_key(label: &str) -> SecretKey {
    let digest: [u8; 32] = Sha256::digest(label.as_bytes()).into();
    SecretKey::from_slice(&digest).unwrap()
}

pub fn x_only(sk: &SecretKey) -> XOnlyPublicKey {
    Keypair::from_secret_key(&Secp256k1::new(), sk)
        .x_only_public_key()
        .0
}

pub fn k256_key(sk: &SecretKey) -> k256::schnorr::SigningKey {
    k256::schnorr::SigningKey::from_bytes(&sk.secret_bytes()).unwrap()
}

pub fn staker_sk() -> SecretKey {
    secret_key("staker")
}

pub fn staker_pk() -> XOnlyPublicKey {
    x_only(&staker_sk())
}

pub fn fp_sk(i: usize) -> SecretKey {
    secret_key(&format!("finality-provider-{i}"))
}

pub fn fp_pk(i: usize) -> XOnlyPublicKey {
    x_only(&fp_sk(i))
}

pub fn covenant_sks(n: usize) -> Vec<SecretKey> {
    (0..n)
        .map(|i| secret_key(&format!("covenant-{i}")))
        .collect()
}

pub fn covenant_pks(n: usize) -> Vec<XOnlyPublicKey> {
    covenant_sks(n).iter().map(x_only).collect()
}
