use lhe_core::security::suggested_default_modulus_chain;
use lhe_core::{
    BatchEncoder, Ciphertext, Context, Decryptor, Encryptor, Error, Evaluator, FromBytes, KeyGenerator,
    ParameterSet, PlainModulus, Plaintext, SecurityLevel, ToBytes,
};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use std::sync::Arc;

fn default_context(t: u64) -> Arc<Context> {
    let q = suggested_default_modulus_chain(4096, SecurityLevel::Tc128).unwrap();
    Context::new(ParameterSet::integer(4096, q, t), SecurityLevel::Tc128).unwrap()
}

#[test]
fn six_squared_plus_one() {
    let ctx = default_context(1024);
    assert_eq!(ctx.parameter_error_message(), "valid");
    let mut rng = ChaCha20Rng::seed_from_u64(2024);
    let keygen = KeyGenerator::new(ctx.clone(), &mut rng);
    let pk = keygen.create_public_key(&mut rng).unwrap();
    let relin = keygen.create_relin_key(&mut rng).unwrap();
    let encryptor = Encryptor::new(ctx.clone(), pk).unwrap();
    let decryptor = Decryptor::new(ctx.clone(), keygen.secret_key()).unwrap();
    let evaluator = Evaluator::new(ctx.clone());
    let fp = ctx.first_data_level().fingerprint();

    let x = encryptor
        .encrypt(&Plaintext::from_hex_poly(&ctx, "6", fp).unwrap(), &mut rng)
        .unwrap();
    let fresh_budget = decryptor.invariant_noise_budget(&x).unwrap();
    assert!(fresh_budget > 0);
    assert_eq!(decryptor.decrypt(&x).unwrap().to_hex_poly().unwrap(), "6");

    let mut y = evaluator.square(&x).unwrap();
    assert_eq!(y.size(), 3);
    evaluator
        .add_plain_inplace(&mut y, &Plaintext::from_hex_poly(&ctx, "1", fp).unwrap())
        .unwrap();
    assert_eq!(decryptor.decrypt(&y).unwrap().to_hex_poly().unwrap(), "25");
    let squared_budget = decryptor.invariant_noise_budget(&y).unwrap();
    assert!(squared_budget > 0 && squared_budget < fresh_budget);

    evaluator.relinearize_inplace(&mut y, &relin).unwrap();
    assert_eq!(y.size(), 2);
    assert_eq!(decryptor.decrypt(&y).unwrap().to_hex_poly().unwrap(), "25");

    let z = evaluator.multiply(&y, &x).unwrap();
    let z = evaluator.relinearize(&z, &relin).unwrap();
    assert!(decryptor.invariant_noise_budget(&z).unwrap() < decryptor.invariant_noise_budget(&y).unwrap());
    // 37 * 6 = 222
    assert_eq!(decryptor.decrypt(&z).unwrap().to_hex_poly().unwrap(), "DE");
}

#[test]
fn lowering_walks_every_data_level_then_stops() {
    let ctx = default_context(1024);
    let mut rng = ChaCha20Rng::seed_from_u64(7);
    let keygen = KeyGenerator::new(ctx.clone(), &mut rng);
    let encryptor = Encryptor::with_secret_key(ctx.clone(), keygen.secret_key()).unwrap();
    let decryptor = Decryptor::new(ctx.clone(), keygen.secret_key()).unwrap();
    let evaluator = Evaluator::new(ctx.clone());
    let fp = ctx.first_data_level().fingerprint();
    let mut ct = encryptor
        .encrypt_symmetric(&Plaintext::from_hex_poly(&ctx, "3x^2 + 1", fp).unwrap(), &mut rng)
        .unwrap();

    for _ in 1..ctx.data_level_count() {
        evaluator.mod_switch_to_next_inplace(&mut ct).unwrap();
        assert!(decryptor.invariant_noise_budget(&ct).unwrap() > 0);
        assert_eq!(decryptor.decrypt(&ct).unwrap().to_hex_poly().unwrap(), "3x^2 + 1");
    }
    assert_eq!(ct.fingerprint(), ctx.last_level().fingerprint());
    assert_eq!(evaluator.mod_switch_to_next_inplace(&mut ct), Err(Error::ChainExhausted));
}

#[test]
fn batched_slots_rotate_and_survive_serialization() {
    let t = PlainModulus::batching(4096, 20).unwrap();
    let ctx = default_context(t);
    let mut rng = ChaCha20Rng::seed_from_u64(99);
    let keygen = KeyGenerator::new(ctx.clone(), &mut rng);
    let pk = keygen.create_public_key(&mut rng).unwrap();
    let rotations = keygen.create_rotation_keys(&[1, 5], &mut rng).unwrap();
    let encoder = BatchEncoder::new(ctx.clone()).unwrap();
    let encryptor = Encryptor::new(ctx.clone(), pk).unwrap();
    let decryptor = Decryptor::new(ctx.clone(), keygen.secret_key()).unwrap();
    let evaluator = Evaluator::new(ctx.clone());
    let fp = ctx.first_data_level().fingerprint();
    let row = encoder.row_size();

    let values: Vec<u64> = (0..encoder.slot_count() as u64).collect();
    let ct = encryptor.encrypt(&encoder.encode(&values, fp).unwrap(), &mut rng).unwrap();
    let rotated = evaluator.rotate_rows(&ct, 5, &rotations).unwrap();
    let slots = encoder.decode(&decryptor.decrypt(&rotated).unwrap()).unwrap();
    for c in 0..row {
        assert_eq!(slots[c], values[(c + 5) % row]);
        assert_eq!(slots[row + c], values[row + (c + 5) % row]);
    }

    let bytes = rotated.to_bytes();
    let restored = Ciphertext::from_bytes(&bytes, &ctx).unwrap();
    assert_eq!(encoder.decode(&decryptor.decrypt(&restored).unwrap()).unwrap(), slots);

    let foreign = default_context(1024);
    assert!(matches!(Ciphertext::from_bytes(&bytes, &foreign), Err(Error::Serialization(_))));
}
