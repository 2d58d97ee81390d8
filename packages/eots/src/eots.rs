use crate::error::Error;
use crate::Result;

use k256::elliptic_curve::point::AffineCoordinates;
use k256::{
    elliptic_curve::{
        ops::{MulByGenerator, Reduce},
        point::DecompressPoint,
        subtle::Choice,
        PrimeField,
    },
    AffinePoint, ProjectivePoint, Scalar, U256,
};
use sha2::{Digest, Sha256};

const CHALLENGE_TAG: &[u8] = b"BIP0340/challenge";

// adapted from https://github.com/RustCrypto/elliptic-curves/blob/520f67d26be1773bd600d05796cc26d797dd7182/k256/src/schnorr.rs#L181-L187
fn tagged_hash(tag: &[u8]) -> Sha256 {
    let tag_hash = Sha256::digest(tag);
    let mut digest = Sha256::new();
    digest.update(tag_hash);
    digest.update(tag_hash);
    digest
}

fn to_array(bytes: &[u8]) -> Result<[u8; 32]> {
    bytes
        .try_into()
        .map_err(|_| Error::InvalidInputLength(bytes.len()))
}

fn lift_x(x_bytes: [u8; 32]) -> Option<ProjectivePoint> {
    let x = k256::FieldBytes::from(x_bytes);
    Option::<AffinePoint>::from(AffinePoint::decompress(&x, Choice::from(0)))
        .map(ProjectivePoint::from)
}

fn point_to_bytes(p: &ProjectivePoint) -> [u8; 32] {
    p.to_affine().x().into()
}

fn has_odd_y(p: &ProjectivePoint) -> bool {
    p.to_affine().y_is_odd().into()
}

fn challenge(r: &ProjectivePoint, p: &ProjectivePoint, msg_hash: &[u8; 32]) -> Scalar {
    <Scalar as Reduce<U256>>::reduce_bytes(
        &tagged_hash(CHALLENGE_TAG)
            .chain_update(point_to_bytes(r))
            .chain_update(point_to_bytes(p))
            .chain_update(msg_hash)
            .finalize(),
    )
}

/// SecRand is the type for a secret randomness
/// It is formed as a scalar on the Secp256k1 curve
pub type SecRand = Scalar;

/// new_sec_rand parses the given bytes into a new secret randomness
/// the given byte slice has to be a 32-byte scalar
pub fn new_sec_rand(r: &[u8]) -> Result<SecRand> {
    let array = to_array(r)?;
    SecRand::from_repr_vartime(array.into()).ok_or(Error::SecretRandomnessParseFailed {})
}

/// PubRand is the type for a public randomness
/// It is formed as a point with even y coord on the Secp256k1 curve
pub type PubRand = ProjectivePoint;

/// new_pub_rand parses the 32-byte x coordinate of a public randomness
pub fn new_pub_rand(x_bytes: &[u8]) -> Result<PubRand> {
    lift_x(to_array(x_bytes)?).ok_or(Error::PublicRandomnessParseFailed {})
}

/// Signature is an extractable one-time signature (EOTS)
/// i.e., s in a Schnorr signature (R, s)
pub type Signature = Scalar;

pub fn new_sig(r: &[u8]) -> Result<Signature> {
    let array = to_array(r)?;
    Signature::from_repr_vartime(array.into()).ok_or(Error::SignatureParseFailed {})
}

/// SecretKey is a secret key, formed as a 32-byte scalar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretKey {
    inner: k256::SecretKey,
}

/// PublicKey is a public key, formed as a point with even y coordinate
/// on the Secp256k1 curve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKey {
    inner: ProjectivePoint,
}

impl SecretKey {
    pub fn from_bytes(x: [u8; 32]) -> Result<Self> {
        let inner = k256::SecretKey::from_bytes(&x.into())
            .map_err(|_| Error::SecretKeyParseFailed {})?;
        Ok(SecretKey { inner })
    }

    pub fn from_hex(x_hex: &str) -> Result<Self> {
        let x_slice = hex::decode(x_hex)?;
        SecretKey::from_bytes(to_array(&x_slice)?)
    }

    /// pubkey gets the even-y public key corresponding to the secret key
    pub fn pubkey(&self) -> PublicKey {
        let p = ProjectivePoint::mul_by_generator(&*self.inner.to_nonzero_scalar());
        let inner = if has_odd_y(&p) { -p } else { p };
        PublicKey { inner }
    }

    /// signing_scalar is the scalar matching the even-y public key
    fn signing_scalar(&self) -> Scalar {
        let x = *self.inner.to_nonzero_scalar();
        if has_odd_y(&ProjectivePoint::mul_by_generator(&x)) {
            -x
        } else {
            x
        }
    }

    /// sign creates a signature with the given secret randomness
    /// and message hash
    pub fn sign(&self, sec_rand: &SecRand, msg_hash: &[u8; 32]) -> Signature {
        let x = self.signing_scalar();
        let p = ProjectivePoint::mul_by_generator(&x);
        // the committed public randomness is the even-y lift of R
        let r_point = ProjectivePoint::mul_by_generator(sec_rand);
        let r = if has_odd_y(&r_point) {
            -*sec_rand
        } else {
            *sec_rand
        };
        let c = challenge(&r_point, &p, msg_hash);
        r + c * x
    }

    /// to_bytes converts the secret key into bytes
    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes().into()
    }
}

impl PublicKey {
    pub fn from_bytes(x_bytes: [u8; 32]) -> Result<Self> {
        let inner = lift_x(x_bytes).ok_or(Error::PublicKeyParseFailed {})?;
        Ok(PublicKey { inner })
    }

    pub fn from_hex(p_hex: &str) -> Result<Self> {
        let p_slice = hex::decode(p_hex)?;
        PublicKey::from_bytes(to_array(&p_slice)?)
    }

    /// to_bytes returns the 32-byte x-only encoding
    pub fn to_bytes(&self) -> [u8; 32] {
        point_to_bytes(&self.inner)
    }

    /// verify verifies whether the given signature w.r.t. the
    /// public key, public randomness and message hash
    pub fn verify(&self, pub_rand: &PubRand, msg_hash: &[u8; 32], sig: &Signature) -> bool {
        let c = challenge(pub_rand, &self.inner, msg_hash);
        let recovered_r = ProjectivePoint::mul_by_generator(sig) - self.inner * c;
        point_to_bytes(&recovered_r) == point_to_bytes(pub_rand) && !has_odd_y(&recovered_r)
    }

    /// extract_secret_key recovers the secret key from two signatures on different messages
    /// under the same public randomness, given in their serialized forms
    pub fn extract_secret_key(
        &self,
        pub_rand: &[u8],
        msg1: &[u8],
        sig1: &[u8],
        msg2: &[u8],
        sig2: &[u8],
    ) -> Result<SecretKey> {
        let pub_rand = new_pub_rand(pub_rand)?;
        let msg1_hash: [u8; 32] = Sha256::digest(msg1).into();
        let msg2_hash: [u8; 32] = Sha256::digest(msg2).into();
        let sig1 = new_sig(sig1)?;
        let sig2 = new_sig(sig2)?;
        extract(self, &pub_rand, &msg1_hash, &sig1, &msg2_hash, &sig2)
    }
}

/// extract extracts the secret key from the public key, public
/// randomness, and two pairs of message hashes and signatures
pub fn extract(
    pk: &PublicKey,
    pub_rand: &PubRand,
    msg1: &[u8; 32],
    sig1: &Signature,
    msg2: &[u8; 32],
    sig2: &Signature,
) -> Result<SecretKey> {
    if msg1 == msg2 {
        return Err(Error::SameMessage {});
    }
    let e1 = challenge(pub_rand, &pk.inner, msg1);
    let e2 = challenge(pub_rand, &pk.inner, msg2);

    // sk = (s1 - s2) / (e1 - e2)
    let inverted_e_delta =
        Option::<Scalar>::from((e1 - e2).invert()).ok_or(Error::SameMessage {})?;
    let sk = (*sig1 - *sig2) * inverted_e_delta;

    let sk = SecretKey::from_bytes(sk.to_bytes().into())?;
    if sk.pubkey() != *pk {
        return Err(Error::ExtractedKeyMismatch {});
    }
    Ok(sk)
}
