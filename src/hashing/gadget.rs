use ark_crypto_primitives::sponge::constraints::CryptographicSpongeVar;
use ark_crypto_primitives::sponge::poseidon::constraints::PoseidonSpongeVar;
use ark_crypto_primitives::sponge::poseidon::PoseidonConfig;
use ark_crypto_primitives::sponge::Absorb;
use ark_ff::PrimeField;
use ark_r1cs_std::{boolean::Boolean, cmp::CmpGadget, eq::EqGadget, fields::fp::FpVar};
use ark_relations::r1cs::{ConstraintSystemRef, SynthesisError};

/// In-circuit counterpart of [`super::CardHasher::hash`].
pub fn poseidon_hash_gadget<F>(
    cs: ConstraintSystemRef<F>,
    config: &PoseidonConfig<F>,
    inputs: &[FpVar<F>],
) -> Result<FpVar<F>, SynthesisError>
where
    F: PrimeField + Absorb,
{
    let mut sponge = PoseidonSpongeVar::<F>::new(cs, config);
    for input in inputs {
        sponge.absorb(input)?;
    }
    let mut squeezed = sponge.squeeze_field_elements(1)?;
    squeezed.pop().ok_or(SynthesisError::Unsatisfiable)
}

/// Enforces `0 <= value < bound`, with `value` interpreted as a canonical integer.
pub fn enforce_less_than<F: PrimeField>(value: &FpVar<F>, bound: u64) -> Result<(), SynthesisError> {
    let bound = FpVar::Constant(F::from(bound));
    value.is_lt(&bound)?.enforce_equal(&Boolean::TRUE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::CardHasher;
    use ark_bn254::Fr;
    use ark_r1cs_std::{alloc::AllocVar, R1CSVar};
    use ark_relations::r1cs::ConstraintSystem;

    #[test]
    fn gadget_matches_native_hash() {
        let hasher = CardHasher::<Fr>::new();
        let inputs = [Fr::from(3u64), Fr::from(14u64), Fr::from(15u64)];
        let expected = hasher.hash(&inputs);

        let cs = ConstraintSystem::<Fr>::new_ref();
        let vars: Vec<FpVar<Fr>> = inputs
            .iter()
            .map(|x| FpVar::new_witness(cs.clone(), || Ok(*x)).unwrap())
            .collect();
        let out = poseidon_hash_gadget(cs.clone(), hasher.config(), &vars).unwrap();

        assert_eq!(out.value().unwrap(), expected);
        assert!(cs.is_satisfied().unwrap());
    }

    #[test]
    fn range_check_accepts_bound_minus_one_and_rejects_bound() {
        let cs = ConstraintSystem::<Fr>::new_ref();
        let ok = FpVar::new_witness(cs.clone(), || Ok(Fr::from(51u64))).unwrap();
        enforce_less_than(&ok, 52).unwrap();
        assert!(cs.is_satisfied().unwrap());

        let cs = ConstraintSystem::<Fr>::new_ref();
        let too_big = FpVar::new_witness(cs.clone(), || Ok(Fr::from(52u64))).unwrap();
        enforce_less_than(&too_big, 52).unwrap();
        assert!(!cs.is_satisfied().unwrap());
    }
}
