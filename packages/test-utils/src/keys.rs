use bitcoin::secp256k1::{Keypair, Secp256k1, SecretKey};
use bitcoin::XOnlyPublicKey;
use sha2::{Digest, Sha256};

/// secret_key derives a fixed secret key from a label
pub fn secret_key(label: &str) -> SecretKey {
    let digest: [u8; 32] = Sha256::digest(label.as_bytes()).into();
    SecretKey::from_slice(&digest).unwrap()
}

pub fn x_only(sk: &SecretKey) -> XOnlyPublicKey {
    Keypair::from_secret_key(&Secp256k1::signing_only(), sk)
        .x_only_public_key()
        .0
}

pub fn pk_hex(sk: &SecretKey) -> String {
    hex::encode(x_only(sk).serialize())
}

pub fn staker_sk(i: usize) -> SecretKey {
    secret_key(&format!("staker-{i}"))
}

pub fn fp_sk(i: usize) -> SecretKey {
    secret_key(&format!("finality-provider-{i}"))
}

pub fn fp_pk_hex(i: usize) -> String {
    pk_hex(&fp_sk(i))
}

pub fn covenant_sks(n: usize) -> Vec<SecretKey> {
    (0..n)
        .map(|i| secret_key(&format!("covenant-{i}")))
        .collect()
}

pub fn covenant_pk_hexes(n: usize) -> Vec<String> {
    covenant_sks(n).iter().map(pk_hex).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_stable_and_distinct() {
        assert_eq!(fp_pk_hex(1), fp_pk_hex(1));
        assert_ne!(fp_pk_hex(1), fp_pk_hex(2));
        let covs = covenant_pk_hexes(5);
        assert_eq!(covs.len(), 5);
        assert!(covs.iter().all(|pk| pk.len() == 64));
        assert!(!covs.contains(&pk_hex(&staker_sk(1))));
    }
}
