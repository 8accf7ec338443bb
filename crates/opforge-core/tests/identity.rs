//! Identity synthesis with injected randomness.

use opforge_core::{synthesize, DeviceModel, IdentityRecord};
use rand::rngs::StdRng;
use rand::SeedableRng;

#[test]
fn same_seed_same_record() {
    let a = synthesize(DeviceModel::MacBookPro16_1, &mut StdRng::seed_from_u64(42)).unwrap();
    let b = synthesize(DeviceModel::MacBookPro16_1, &mut StdRng::seed_from_u64(42)).unwrap();
    assert_eq!(a, b);
}

#[test]
fn different_seeds_differ() {
    let a = synthesize(DeviceModel::MacPro7_1, &mut StdRng::seed_from_u64(1)).unwrap();
    let b = synthesize(DeviceModel::MacPro7_1, &mut StdRng::seed_from_u64(2)).unwrap();
    assert_ne!(a, b);
}

#[test]
fn token_shapes() {
    let mut rng = StdRng::seed_from_u64(99);
    for model in DeviceModel::ALL {
        let rec = synthesize(model, &mut rng).unwrap();
        assert_eq!(rec.model, model);
        assert_eq!(rec.primary_serial.len(), 12);
        assert_eq!(rec.board_serial.len(), 12);
        assert_eq!(rec.secondary_serial.len(), 20);

        let groups: Vec<usize> = rec.uuid.split('-').map(str::len).collect();
        assert_eq!(groups, vec![8, 4, 4, 4, 12]);

        let all = [&rec.primary_serial, &rec.board_serial, &rec.secondary_serial, &rec.uuid];
        for token in all {
            assert!(token
                .chars()
                .all(|c| c == '-' || c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }
}

#[test]
fn edited_identity_round_trips_through_from_parts() {
    let rec = synthesize(DeviceModel::IMac20_1, &mut StdRng::seed_from_u64(5)).unwrap();
    let rebuilt = IdentityRecord::from_parts(
        rec.model,
        rec.primary_serial.clone(),
        rec.uuid.clone(),
        rec.board_serial.clone(),
        rec.secondary_serial.clone(),
    )
    .unwrap();
    assert_eq!(rec, rebuilt);
}
