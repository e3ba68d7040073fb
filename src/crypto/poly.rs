//! Secret-sharing polynomials and Lagrange recovery.
//!
//! Share indices are zero-based participant positions; the evaluation
//! abscissa for index `i` is `i + 1` so that the secret sits at `x = 0`.

use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::Identity;
use rand::{CryptoRng, RngCore};

use crate::errors::DkgError;

/// A private share held by one participant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PriShare {
    pub index: u32,
    pub value: Scalar,
}

/// A public share: one participant's evaluation of a committed polynomial.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PubShare {
    pub index: u32,
    pub value: EdwardsPoint,
}

/// A secret polynomial of degree `threshold - 1`.
#[derive(Clone, Debug)]
pub struct SecretPoly {
    coeffs: Vec<Scalar>,
}

impl SecretPoly {
    /// Sample a polynomial with a fresh uniform constant term.
    pub fn random<R: RngCore + CryptoRng>(threshold: u32, rng: &mut R) -> Self {
        let secret = Scalar::random(rng);
        Self::with_secret(secret, threshold, rng)
    }

    /// Sample a polynomial with a fixed constant term (used by resharing,
    /// where a dealer redistributes its current share).
    pub fn with_secret<R: RngCore + CryptoRng>(
        secret: Scalar,
        threshold: u32,
        rng: &mut R,
    ) -> Self {
        let mut coeffs = Vec::with_capacity(threshold as usize);
        coeffs.push(secret);
        for _ in 1..threshold {
            coeffs.push(Scalar::random(rng));
        }
        Self { coeffs }
    }

    pub fn secret(&self) -> &Scalar {
        &self.coeffs[0]
    }

    pub fn threshold(&self) -> u32 {
        self.coeffs.len() as u32
    }

    /// Evaluate the share for participant `index`.
    pub fn eval(&self, index: u32) -> PriShare {
        let x = Scalar::from(u64::from(index) + 1);
        let mut value = Scalar::ZERO;
        for coeff in self.coeffs.iter().rev() {
            value = value * x + coeff;
        }
        PriShare { index, value }
    }

    /// Commit each coefficient to the base point.
    pub fn commit(&self) -> PublicPoly {
        PublicPoly {
            commits: self
                .coeffs
                .iter()
                .map(EdwardsPoint::mul_base)
                .collect(),
        }
    }
}

/// A committed polynomial: one base-point commitment per coefficient.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicPoly {
    commits: Vec<EdwardsPoint>,
}

impl PublicPoly {
    pub fn new(commits: Vec<EdwardsPoint>) -> Self {
        Self { commits }
    }

    pub fn commits(&self) -> &[EdwardsPoint] {
        &self.commits
    }

    pub fn threshold(&self) -> u32 {
        self.commits.len() as u32
    }

    /// The commitment to the constant term, i.e. the contributed public key.
    pub fn constant(&self) -> EdwardsPoint {
        self.commits[0]
    }

    /// Evaluate the public verification share for participant `index`.
    pub fn eval(&self, index: u32) -> PubShare {
        let x = Scalar::from(u64::from(index) + 1);
        let mut value = EdwardsPoint::identity();
        for commit in self.commits.iter().rev() {
            value = value * x + commit;
        }
        PubShare { index, value }
    }

    /// Coefficient-wise sum of two committed polynomials.
    pub fn add(&self, other: &PublicPoly) -> Result<PublicPoly, DkgError> {
        if self.commits.len() != other.commits.len() {
            return Err(DkgError::Crypto(format!(
                "commitment degree mismatch: {} vs {}",
                self.commits.len(),
                other.commits.len()
            )));
        }
        Ok(PublicPoly {
            commits: self
                .commits
                .iter()
                .zip(&other.commits)
                .map(|(a, b)| a + b)
                .collect(),
        })
    }

    /// Coefficient-wise scaling, used when recombining reshared commitments.
    pub fn scale(&self, factor: &Scalar) -> PublicPoly {
        PublicPoly {
            commits: self.commits.iter().map(|c| c * factor).collect(),
        }
    }
}

/// Lagrange basis coefficients at `x = 0` for the given share indices.
pub fn lagrange_at_zero(indices: &[u32]) -> Result<Vec<Scalar>, DkgError> {
    if indices.is_empty() {
        return Err(DkgError::RecoveryShort {
            required: 1,
            provided: 0,
        });
    }

    let xs: Vec<Scalar> = indices
        .iter()
        .map(|i| Scalar::from(u64::from(*i) + 1))
        .collect();

    let mut basis = Vec::with_capacity(xs.len());
    for (i, xi) in xs.iter().enumerate() {
        let mut num = Scalar::ONE;
        let mut den = Scalar::ONE;
        for (j, xj) in xs.iter().enumerate() {
            if i == j {
                continue;
            }
            num *= xj;
            den *= xj - xi;
        }
        if den == Scalar::ZERO {
            return Err(DkgError::Crypto("duplicate share index".into()));
        }
        basis.push(num * den.invert());
    }
    Ok(basis)
}

/// Recover the group element committed at `x = 0` from public shares.
pub fn recover_commit(shares: &[PubShare]) -> Result<EdwardsPoint, DkgError> {
    let indices: Vec<u32> = shares.iter().map(|s| s.index).collect();
    let basis = lagrange_at_zero(&indices)?;
    let mut acc = EdwardsPoint::identity();
    for (share, lambda) in shares.iter().zip(&basis) {
        acc += share.value * lambda;
    }
    Ok(acc)
}

/// Recover the secret at `x = 0` from private shares.
pub fn recover_secret(shares: &[PriShare]) -> Result<Scalar, DkgError> {
    let indices: Vec<u32> = shares.iter().map(|s| s.index).collect();
    let basis = lagrange_at_zero(&indices)?;
    let mut acc = Scalar::ZERO;
    for (share, lambda) in shares.iter().zip(&basis) {
        acc += share.value * lambda;
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn shares_match_commitments() {
        let poly = SecretPoly::random(3, &mut OsRng);
        let commits = poly.commit();

        for index in 0..5 {
            let share = poly.eval(index);
            let expected = commits.eval(index);
            assert_eq!(EdwardsPoint::mul_base(&share.value), expected.value);
        }
    }

    #[test]
    fn any_threshold_shares_recover_the_secret() {
        let poly = SecretPoly::random(3, &mut OsRng);

        let shares: Vec<PriShare> = [4u32, 1, 2].iter().map(|i| poly.eval(*i)).collect();
        let recovered = recover_secret(&shares).unwrap();
        assert_eq!(&recovered, poly.secret());
    }

    #[test]
    fn commit_recovery_matches_constant() {
        let poly = SecretPoly::random(2, &mut OsRng);
        let commits = poly.commit();

        let shares: Vec<PubShare> = [0u32, 3].iter().map(|i| commits.eval(*i)).collect();
        let recovered = recover_commit(&shares).unwrap();
        assert_eq!(recovered, commits.constant());
    }

    #[test]
    fn duplicate_indices_are_rejected() {
        let poly = SecretPoly::random(2, &mut OsRng);
        let shares = vec![poly.eval(1), poly.eval(1)];
        assert!(recover_secret(&shares).is_err());
    }

    #[test]
    fn summed_polynomials_share_like_the_summed_secret() {
        // The certification step sums shares from every qualified dealer;
        // the result must be a share of the summed secret.
        let a = SecretPoly::random(3, &mut OsRng);
        let b = SecretPoly::random(3, &mut OsRng);

        let shares: Vec<PriShare> = (0..3)
            .map(|i| PriShare {
                index: i,
                value: a.eval(i).value + b.eval(i).value,
            })
            .collect();

        let recovered = recover_secret(&shares).unwrap();
        assert_eq!(recovered, a.secret() + b.secret());
    }
}
