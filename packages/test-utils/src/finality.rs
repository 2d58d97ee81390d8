use bitcoin::secp256k1::SecretKey;
use k256::elliptic_curve::ops::MulByGenerator;
use k256::elliptic_curve::point::AffineCoordinates;
use k256::elliptic_curve::PrimeField;
use k256::{ProjectivePoint, Scalar};
use sha2::{Digest, Sha256};

use babylon_apis::btc_staking_api::Evidence;

/// double_sign_evidence has the finality provider of `fp_sk` vote for two different blocks at
/// `height` with the same public randomness
pub fn double_sign_evidence(fp_sk: &SecretKey, height: u64) -> Evidence {
    let sk = eots::SecretKey::from_bytes(fp_sk.secret_bytes()).unwrap();

    let r_bytes: [u8; 32] = Sha256::new()
        .chain_update(fp_sk.secret_bytes())
        .chain_update(height.to_be_bytes())
        .finalize()
        .into();
    let sec_rand = Scalar::from_repr_vartime(r_bytes.into()).unwrap();
    let pub_rand: [u8; 32] = ProjectivePoint::mul_by_generator(&sec_rand)
        .to_affine()
        .x()
        .into();

    let canonical_app_hash = Sha256::digest(b"canonical").to_vec();
    let fork_app_hash = Sha256::digest(b"fork").to_vec();
    let sign = |app_hash: &[u8]| -> Vec<u8> {
        let msg = Evidence::msg_to_sign(height, app_hash);
        let msg_hash: [u8; 32] = Sha256::digest(&msg).into();
        sk.sign(&sec_rand, &msg_hash).to_bytes().to_vec()
    };

    Evidence {
        fp_btc_pk: sk.pubkey().to_bytes().to_vec(),
        block_height: height,
        pub_rand: pub_rand.to_vec(),
        canonical_finality_sig: sign(&canonical_app_hash),
        fork_finality_sig: sign(&fork_app_hash),
        canonical_app_hash,
        fork_app_hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{fp_sk, x_only};

    #[test]
    fn evidence_reveals_the_key() {
        let evidence = double_sign_evidence(&fp_sk(1), 42);
        assert_eq!(evidence.fp_btc_pk, x_only(&fp_sk(1)).serialize().to_vec());

        let pk = eots::PublicKey::from_bytes(evidence.fp_btc_pk.clone().try_into().unwrap())
            .unwrap();
        let extracted = pk
            .extract_secret_key(
                &evidence.pub_rand,
                &Evidence::msg_to_sign(42, &evidence.canonical_app_hash),
                &evidence.canonical_finality_sig,
                &Evidence::msg_to_sign(42, &evidence.fork_app_hash),
                &evidence.fork_finality_sig,
            )
            .unwrap();
        assert_eq!(extracted.pubkey(), pk);
    }
}
