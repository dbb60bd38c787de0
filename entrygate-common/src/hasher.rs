//! Poseidon over the BN254 scalar field with circom's round constants.
//!
//! The membership circuit hashes with circomlib's `Poseidon(n)` template, so
//! the hasher is built from `light-poseidon`'s circom parameter set (width
//! `n + 1`, 8 full rounds, circom partial-round table). Inputs are reduced into
//! the field before hashing; circomlib does the same implicitly because every
//! circuit signal already lives in the field.

use ark_bn254::Fr;
use light_poseidon::{Poseidon, PoseidonHasher};

use crate::{
    error::{GateError, GateResult},
    field::FieldElement,
};

pub struct FieldHasher {
    single: Poseidon<Fr>,
    pair: Poseidon<Fr>,
}

impl FieldHasher {
    pub fn new() -> GateResult<Self> {
        Ok(Self {
            single: Poseidon::<Fr>::new_circom(1).map_err(primitive_error)?,
            pair: Poseidon::<Fr>::new_circom(2).map_err(primitive_error)?,
        })
    }

    /// `Poseidon(reduce(left), reduce(right))` for arbitrary byte strings.
    pub fn hash2(&mut self, left: &[u8], right: &[u8]) -> GateResult<FieldElement> {
        let left = FieldElement::reduce_be_bytes(left);
        let right = FieldElement::reduce_be_bytes(right);
        self.hash_pair(&left, &right)
    }

    pub fn hash_pair(
        &mut self,
        left: &FieldElement,
        right: &FieldElement,
    ) -> GateResult<FieldElement> {
        let out = self
            .pair
            .hash(&[left.to_fr(), right.to_fr()])
            .map_err(primitive_error)?;
        Ok(FieldElement::from_fr(&out))
    }

    /// `Poseidon(reduce(preimage))`, the single-input commitment.
    pub fn commit(&mut self, preimage: &[u8]) -> GateResult<FieldElement> {
        let input = FieldElement::reduce_be_bytes(preimage);
        let out = self.single.hash(&[input.to_fr()]).map_err(primitive_error)?;
        Ok(FieldElement::from_fr(&out))
    }

    /// Leaf value for a ticket holder.
    pub fn identity_commitment(&mut self, user_id: &str) -> GateResult<FieldElement> {
        self.commit(user_id.as_bytes())
    }
}

fn primitive_error(err: impl std::fmt::Display) -> GateError {
    GateError::internal(format!("poseidon primitive failed: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::field_modulus;
    use num_bigint::BigUint;
    use proptest::prelude::*;

    #[test]
    fn matches_circomlib_reference_vectors() {
        // circomlibjs: poseidon([1, 2])
        let mut hasher = FieldHasher::new().unwrap();
        let out = hasher
            .hash_pair(
                &FieldElement::from_decimal("1").unwrap(),
                &FieldElement::from_decimal("2").unwrap(),
            )
            .unwrap();
        assert_eq!(
            out.to_decimal(),
            "7853200120776062878684798364095072458815029376092732009249414926327459813530"
        );
    }

    #[test]
    fn single_and_pair_arity_differ() {
        let mut hasher = FieldHasher::new().unwrap();
        let one = FieldElement::from_decimal("1").unwrap();
        assert_ne!(
            hasher.commit(&[1u8]).unwrap(),
            hasher.hash_pair(&one, &FieldElement::ZERO).unwrap()
        );
    }

    #[test]
    fn hash2_reduces_before_hashing() {
        let mut hasher = FieldHasher::new().unwrap();
        let above = (field_modulus() + BigUint::from(7u32)).to_bytes_be();
        let seven = [7u8];
        assert_eq!(
            hasher.hash2(&above, &[1u8]).unwrap(),
            hasher.hash2(&seven, &[1u8]).unwrap()
        );
    }

    #[test]
    fn identity_commitment_is_deterministic_and_distinct() {
        let mut hasher = FieldHasher::new().unwrap();
        let alice = hasher.identity_commitment("user-alice").unwrap();
        assert_eq!(alice, hasher.identity_commitment("user-alice").unwrap());
        assert_ne!(alice, hasher.identity_commitment("user-bob").unwrap());
        assert!(!alice.is_zero());
    }

    proptest! {
        #[test]
        fn commitment_ignores_multiples_of_the_modulus(seed in proptest::collection::vec(any::<u8>(), 0..48), k in 1u32..4) {
            let mut hasher = FieldHasher::new().unwrap();
            let value = BigUint::from_bytes_be(&seed);
            let shifted = &value + field_modulus() * BigUint::from(k);
            let reduced = (&value % field_modulus()).to_bytes_be();
            prop_assert_eq!(
                hasher.commit(&shifted.to_bytes_be()).unwrap(),
                hasher.commit(&reduced).unwrap()
            );
        }
    }
}
