use crate::error::Error;
use crate::Result;

use k256::elliptic_curve::group::prime::PrimeCurveAffine;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::schnorr::{Signature as SchnorrSignature, SigningKey, VerifyingKey};
use k256::{
    elliptic_curve::{
        ops::{MulByGenerator, Reduce},
        point::{AffineCoordinates, DecompressPoint},
        PrimeField,
    },
    AffinePoint, FieldBytes, ProjectivePoint, Scalar, U256,
};
use sha2::{Digest, Sha256};

/// MODNSCALAR_SIZE is the size of a scalar on the secp256k1 curve
const MODNSCALAR_SIZE: usize = 32;

/// JACOBIAN_POINT_SIZE is the size of a point on the secp256k1 curve in
/// compressed form
const JACOBIAN_POINT_SIZE: usize = 33;

/// ADAPTOR_SIGNATURE_SIZE is the size of a Schnorr adaptor signature
/// It is in the form of (R, s, needsNegation) where `R` is a point,
/// `s` is a scalar, and `needsNegation` is a boolean value
pub const ADAPTOR_SIGNATURE_SIZE: usize = JACOBIAN_POINT_SIZE + MODNSCALAR_SIZE + 1;

const CHALLENGE_TAG: &[u8] = b"BIP0340/challenge";
const NONCE_TAG: &[u8] = b"BTCStaking/adaptor_nonce";

/// AdaptorSignature is a Schnorr signature encrypted under a public key T, so that the
/// holder of t = dlog(T) can turn it into a valid BIP-340 signature, and anyone seeing
/// both can recover t
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdaptorSignature {
    r: ProjectivePoint,
    s_hat: Scalar,
    needs_negation: bool,
}

// Adapted from https://github.com/RustCrypto/elliptic-curves/blob/520f67d26be1773bd600d05796cc26d797dd7182/k256/src/schnorr.rs#L181-L187
fn tagged_hash(tag: &[u8]) -> Sha256 {
    let tag_hash = Sha256::digest(tag);
    let mut digest = Sha256::new();
    digest.update(tag_hash);
    digest.update(tag_hash);
    digest
}

fn challenge(r: &ProjectivePoint, pub_key: &VerifyingKey, msg: &[u8; 32]) -> Scalar {
    <Scalar as Reduce<U256>>::reduce_bytes(
        &tagged_hash(CHALLENGE_TAG)
            .chain_update(r.to_affine().x())
            .chain_update(pub_key.to_bytes())
            .chain_update(msg)
            .finalize(),
    )
}

/// bytes_to_point lifts an x-only key to the curve point with even y
pub fn bytes_to_point(bytes: &[u8]) -> Result<ProjectivePoint> {
    if bytes.len() != MODNSCALAR_SIZE {
        return Err(Error::DecompressPointFailed {});
    }
    let point: Option<AffinePoint> = AffinePoint::decompress(
        FieldBytes::from_slice(bytes),
        k256::elliptic_curve::subtle::Choice::from(false as u8),
    )
    .into();
    point
        .map(ProjectivePoint::from)
        .ok_or(Error::DecompressPointFailed {})
}

/// even_y_secret returns the scalar whose public point is the even-y lift of `key`
fn even_y_secret(key: &SigningKey) -> Scalar {
    let d: Scalar = *key.as_nonzero_scalar().as_ref();
    if ProjectivePoint::mul_by_generator(&d)
        .to_affine()
        .y_is_odd()
        .into()
    {
        -d
    } else {
        d
    }
}

fn scalar_from_bytes(bytes: &[u8]) -> Result<Scalar> {
    if bytes.len() != MODNSCALAR_SIZE {
        return Err(Error::FailedToParseScalar {});
    }
    Scalar::from_repr_vartime(*FieldBytes::from_slice(bytes)).ok_or(Error::FailedToParseScalar {})
}

impl AdaptorSignature {
    pub fn new(asig_bytes: &[u8]) -> Result<Self> {
        if asig_bytes.len() != ADAPTOR_SIGNATURE_SIZE {
            return Err(Error::MalformedAdaptorSignature(
                ADAPTOR_SIGNATURE_SIZE,
                asig_bytes.len(),
            ));
        }
        // get R
        if asig_bytes[0] != 0x02 && asig_bytes[0] != 0x03 {
            return Err(Error::InvalidAdaptorSignatureFirstByte(asig_bytes[0]));
        }
        let is_y_odd = asig_bytes[0] == 0x03;
        let r: Option<AffinePoint> = AffinePoint::decompress(
            FieldBytes::from_slice(&asig_bytes[1..JACOBIAN_POINT_SIZE]),
            k256::elliptic_curve::subtle::Choice::from(is_y_odd as u8),
        )
        .into();
        let r = r
            .map(ProjectivePoint::from)
            .ok_or(Error::DecompressPointFailed {})?;

        // get s_hat
        let s_hat =
            scalar_from_bytes(&asig_bytes[JACOBIAN_POINT_SIZE..JACOBIAN_POINT_SIZE + MODNSCALAR_SIZE])?;

        let needs_negation = asig_bytes[JACOBIAN_POINT_SIZE + MODNSCALAR_SIZE] == 0x01;
        Ok(AdaptorSignature {
            r,
            s_hat,
            needs_negation,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(ADAPTOR_SIGNATURE_SIZE);
        bytes.extend_from_slice(self.r.to_affine().to_encoded_point(true).as_bytes());
        bytes.extend_from_slice(&self.s_hat.to_bytes());
        bytes.push(self.needs_negation as u8);
        bytes
    }

    /// enc_sign produces an adaptor signature on `msg` under `sign_key`, encrypted by `enc_key`.
    /// The nonce is derived deterministically from the secret key, the encryption key and the
    /// message.
    pub fn enc_sign(sign_key: &SigningKey, enc_key: &VerifyingKey, msg: [u8; 32]) -> Result<Self> {
        let d = even_y_secret(sign_key);
        let t = bytes_to_point(&enc_key.to_bytes())?;

        let mut counter: u32 = 0;
        let k = loop {
            let candidate = <Scalar as Reduce<U256>>::reduce_bytes(
                &tagged_hash(NONCE_TAG)
                    .chain_update(d.to_bytes())
                    .chain_update(enc_key.to_bytes())
                    .chain_update(msg)
                    .chain_update(counter.to_be_bytes())
                    .finalize(),
            );
            if candidate != Scalar::ZERO {
                break candidate;
            }
            counter = counter.checked_add(1).ok_or(Error::NonceGenerationFailed {})?;
        };

        let mut k = k;
        let mut r = ProjectivePoint::mul_by_generator(&k) + t;
        if r.to_affine().is_identity().into() {
            return Err(Error::PointAtInfinity("R".to_string()));
        }
        // R must have even y so that its x coordinate alone identifies it in the final signature
        let needs_negation: bool = r.to_affine().y_is_odd().into();
        if needs_negation {
            k = -k;
            r = -r;
        }

        let e = challenge(&r, sign_key.verifying_key(), &msg);
        let s_hat = k + e * d;

        Ok(AdaptorSignature {
            r,
            s_hat,
            needs_negation,
        })
    }

    pub fn verify(
        &self,
        pub_key: &VerifyingKey,
        enc_key: &VerifyingKey,
        msg: [u8; 32],
    ) -> Result<()> {
        let p = bytes_to_point(&pub_key.to_bytes())?;
        let t = bytes_to_point(&enc_key.to_bytes())?;

        // R' = R - T, or R + T if the nonce was negated
        let r_hat = if self.needs_negation {
            self.r + t
        } else {
            self.r - t
        };
        let r_hat = r_hat.to_affine();

        // expected R' = s'*G - e*P
        let e = challenge(&self.r, pub_key, &msg);
        let expected_r_hat = (ProjectivePoint::mul_by_generator(&self.s_hat) - p * e).to_affine();

        if expected_r_hat.is_identity().into() {
            return Err(Error::PointAtInfinity("expected R'".to_string()));
        }

        if self.r.to_affine().y_is_odd().into() {
            return Err(Error::PointWithOddY("R".to_string()));
        }

        if r_hat != expected_r_hat {
            return Err(Error::VerifyAdaptorSigFailed {});
        }

        Ok(())
    }

    /// decrypt turns the adaptor signature into a BIP-340 signature using the decryption key
    pub fn decrypt(&self, dec_key: &SigningKey) -> Result<SchnorrSignature> {
        let mut t = even_y_secret(dec_key);
        if self.needs_negation {
            t = -t;
        }
        let s = self.s_hat + t;

        let mut sig_bytes = [0u8; 64];
        sig_bytes[..32].copy_from_slice(&self.r.to_affine().x());
        sig_bytes[32..].copy_from_slice(&s.to_bytes());
        SchnorrSignature::try_from(&sig_bytes[..])
            .map_err(|e| Error::InvalidSchnorrSignature(e.to_string()))
    }

    /// extract recovers the decryption key from a decrypted signature, checking that it matches
    /// `enc_key`
    pub fn extract(&self, sig: &SchnorrSignature, enc_key: &VerifyingKey) -> Result<SigningKey> {
        let sig_bytes = sig.to_bytes();
        if sig_bytes[..32] != self.r.to_affine().x()[..] {
            return Err(Error::AdaptorSigMismatch {});
        }
        let s = scalar_from_bytes(&sig_bytes[32..])?;

        let mut t = s - self.s_hat;
        if self.needs_negation {
            t = -t;
        }
        let t_point = ProjectivePoint::mul_by_generator(&t);
        if t_point != bytes_to_point(&enc_key.to_bytes())? {
            return Err(Error::ExtractedSecretMismatch {});
        }

        SigningKey::from_bytes(&t.to_bytes())
            .map_err(|e| Error::FailedToParseSecretKey(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_keys::{k256_key, secret_key};
    use k256::schnorr::signature::hazmat::PrehashVerifier;

    fn msg(seed: u8) -> [u8; 32] {
        Sha256::digest([seed]).into()
    }

    #[test]
    fn enc_sign_verify_decrypt() {
        for i in 0..16u8 {
            let sk = k256_key(&secret_key(&format!("signer-{i}")));
            let dk = k256_key(&secret_key(&format!("enc-{i}")));
            let m = msg(i);

            let asig = AdaptorSignature::enc_sign(&sk, dk.verifying_key(), m).unwrap();
            asig.verify(sk.verifying_key(), dk.verifying_key(), m)
                .unwrap();

            let sig = asig.decrypt(&dk).unwrap();
            sk.verifying_key().verify_prehash(&m, &sig).unwrap();

            let extracted = asig.extract(&sig, dk.verifying_key()).unwrap();
            assert_eq!(extracted.verifying_key(), dk.verifying_key());
        }
    }

    #[test]
    fn enc_sign_is_deterministic() {
        let sk = k256_key(&secret_key("signer"));
        let dk = k256_key(&secret_key("enc"));
        let a = AdaptorSignature::enc_sign(&sk, dk.verifying_key(), msg(1)).unwrap();
        let b = AdaptorSignature::enc_sign(&sk, dk.verifying_key(), msg(1)).unwrap();
        assert_eq!(a.to_bytes(), b.to_bytes());
        assert_eq!(AdaptorSignature::new(&a.to_bytes()).unwrap(), a);
    }

    #[test]
    fn verify_rejects_wrong_message_or_key() {
        let sk = k256_key(&secret_key("signer"));
        let dk = k256_key(&secret_key("enc"));
        let other = k256_key(&secret_key("other"));
        let asig = AdaptorSignature::enc_sign(&sk, dk.verifying_key(), msg(1)).unwrap();

        assert_eq!(
            asig.verify(sk.verifying_key(), dk.verifying_key(), msg(2)),
            Err(Error::VerifyAdaptorSigFailed {})
        );
        assert_eq!(
            asig.verify(sk.verifying_key(), other.verifying_key(), msg(1)),
            Err(Error::VerifyAdaptorSigFailed {})
        );
    }

    #[test]
    fn decrypt_with_wrong_key_fails_verification() {
        let sk = k256_key(&secret_key("signer"));
        let dk = k256_key(&secret_key("enc"));
        let other = k256_key(&secret_key("other"));
        let asig = AdaptorSignature::enc_sign(&sk, dk.verifying_key(), msg(3)).unwrap();
        let sig = asig.decrypt(&other).unwrap();
        assert!(sk.verifying_key().verify_prehash(&msg(3), &sig).is_err());
        assert!(matches!(
            asig.extract(&sig, dk.verifying_key()),
            Err(Error::ExtractedSecretMismatch {})
        ));
    }

    #[test]
    fn new_rejects_malformed_bytes() {
        assert_eq!(
            AdaptorSignature::new(&[0u8; 10]),
            Err(Error::MalformedAdaptorSignature(ADAPTOR_SIGNATURE_SIZE, 10))
        );
        let mut bytes = [0u8; ADAPTOR_SIGNATURE_SIZE];
        bytes[0] = 0x04;
        assert_eq!(
            AdaptorSignature::new(&bytes),
            Err(Error::InvalidAdaptorSignatureFirstByte(0x04))
        );
    }
}
