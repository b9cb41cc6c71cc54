use approx::assert_abs_diff_eq;
use lhe_core::{
    Ciphertext, CkksEncoder, CoeffModulus, Context, Decryptor, Encryptor, Error, Evaluator, FromBytes,
    KeyGenerator, ParameterSet, SecurityLevel, ToBytes,
};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use std::sync::Arc;

fn context() -> Arc<Context> {
    let q = CoeffModulus::create(8192, &[60, 40, 40, 60]).unwrap();
    Context::new(ParameterSet::approximate(8192, q), SecurityLevel::Tc128).unwrap()
}

const INPUT: [f64; 4] = [0.0, 1.1, 2.2, 3.3];
const SQUARES: [f64; 4] = [0.0, 1.21, 4.84, 10.89];

#[test]
fn square_at_scale_two_to_the_thirty() {
    let ctx = context();
    let mut rng = ChaCha20Rng::seed_from_u64(30);
    let keygen = KeyGenerator::new(ctx.clone(), &mut rng);
    let pk = keygen.create_public_key(&mut rng).unwrap();
    let relin = keygen.create_relin_key(&mut rng).unwrap();
    let encoder = CkksEncoder::new(ctx.clone()).unwrap();
    let encryptor = Encryptor::new(ctx.clone(), pk).unwrap();
    let decryptor = Decryptor::new(ctx.clone(), keygen.secret_key()).unwrap();
    let evaluator = Evaluator::new(ctx.clone());
    let fp = ctx.first_data_level().fingerprint();
    let scale = 2f64.powi(30);

    let x = encryptor.encrypt(&encoder.encode(&INPUT, scale, fp).unwrap(), &mut rng).unwrap();
    let mut y = evaluator.square(&x).unwrap();
    assert_eq!(y.size(), 3);
    evaluator.relinearize_inplace(&mut y, &relin).unwrap();
    assert_eq!(y.size(), 2);
    assert_eq!(y.scale(), Some(2f64.powi(60)));

    let out = encoder.decode(&decryptor.decrypt(&y).unwrap()).unwrap();
    for (got, want) in out.iter().zip(SQUARES) {
        assert_abs_diff_eq!(*got, want, epsilon = 1e-4);
    }
    assert!(out[4..].iter().all(|v| v.abs() < 1e-4));
}

#[test]
fn square_and_rescale_at_scale_two_to_the_forty() {
    let ctx = context();
    let mut rng = ChaCha20Rng::seed_from_u64(40);
    let keygen = KeyGenerator::new(ctx.clone(), &mut rng);
    let pk = keygen.create_public_key(&mut rng).unwrap();
    let relin = keygen.create_relin_key(&mut rng).unwrap();
    let encoder = CkksEncoder::new(ctx.clone()).unwrap();
    let encryptor = Encryptor::new(ctx.clone(), pk).unwrap();
    let decryptor = Decryptor::new(ctx.clone(), keygen.secret_key()).unwrap();
    let evaluator = Evaluator::new(ctx.clone());
    let level = ctx.first_data_level();
    let scale = 2f64.powi(40);

    let x = encryptor
        .encrypt(&encoder.encode(&INPUT, scale, level.fingerprint()).unwrap(), &mut rng)
        .unwrap();
    let y = evaluator.relinearize(&evaluator.square(&x).unwrap(), &relin).unwrap();
    let y = evaluator.rescale_to_next(&y).unwrap();
    let dropped = level.moduli()[level.moduli().len() - 1];
    assert_eq!(y.scale(), Some(scale * scale / dropped as f64));
    assert_eq!(y.fingerprint(), ctx.next_lower(&level.fingerprint()).unwrap().fingerprint());

    let out = encoder.decode(&decryptor.decrypt(&y).unwrap()).unwrap();
    for (got, want) in out.iter().zip(SQUARES) {
        assert_abs_diff_eq!(*got, want, epsilon = 1e-6);
    }

    // x must be brought to y's level and scale before they can be combined
    let x_low = evaluator.mod_switch_to_next(&x).unwrap();
    assert!(matches!(evaluator.add(&x_low, &y), Err(Error::ScaleMismatch { .. })));
    let mut x_low = x_low;
    x_low.set_scale(y.scale().unwrap()).unwrap();
    let sum = evaluator.add(&x_low, &y).unwrap();
    let out = encoder.decode(&decryptor.decrypt(&sum).unwrap()).unwrap();
    assert_abs_diff_eq!(out[3], 3.3 + 10.89, epsilon = 1e-4);
}

#[test]
fn rotation_conjugation_and_serialization() {
    let ctx = context();
    let mut rng = ChaCha20Rng::seed_from_u64(41);
    let keygen = KeyGenerator::new(ctx.clone(), &mut rng);
    let pk = keygen.create_public_key(&mut rng).unwrap();
    let rotations = keygen.create_rotation_keys(&[1, -1], &mut rng).unwrap();
    let encoder = CkksEncoder::new(ctx.clone()).unwrap();
    let encryptor = Encryptor::new(ctx.clone(), pk).unwrap();
    let decryptor = Decryptor::new(ctx.clone(), keygen.secret_key()).unwrap();
    let evaluator = Evaluator::new(ctx.clone());
    let fp = ctx.first_data_level().fingerprint();
    let slots = encoder.slot_count();

    let x = encryptor
        .encrypt(&encoder.encode(&INPUT, 2f64.powi(40), fp).unwrap(), &mut rng)
        .unwrap();
    let left = encoder
        .decode(&decryptor.decrypt(&evaluator.rotate_vector(&x, 1, &rotations).unwrap()).unwrap())
        .unwrap();
    assert_abs_diff_eq!(left[0], 1.1, epsilon = 1e-6);
    assert_abs_diff_eq!(left[2], 3.3, epsilon = 1e-6);
    let right = encoder
        .decode(&decryptor.decrypt(&evaluator.rotate_vector(&x, -1, &rotations).unwrap()).unwrap())
        .unwrap();
    assert_abs_diff_eq!(right[1], 0.0, epsilon = 1e-6);
    assert_abs_diff_eq!(right[4], 3.3, epsilon = 1e-6);
    assert_abs_diff_eq!(right[slots - 1], 0.0, epsilon = 1e-6);

    assert!(matches!(
        evaluator.complex_conjugate(&x, &rotations),
        Err(Error::MissingRotationKey(_))
    ));

    let restored = Ciphertext::from_bytes(&x.to_bytes(), &ctx).unwrap();
    assert_eq!(restored.scale(), x.scale());
    let out = encoder.decode(&decryptor.decrypt(&restored).unwrap()).unwrap();
    for (got, want) in out.iter().zip(INPUT) {
        assert_abs_diff_eq!(*got, want, epsilon = 1e-6);
    }
}
