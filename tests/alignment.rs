extern crate pcm_shm;

use std::mem::size_of;

use pcm_shm::error::*;
use pcm_shm::*;

type Small = SharedTelemetryState<4, 2, 3>;

#[test]
fn test_invalid_alignments() {
    for alignment in &[3, 5, 100] {
        let err = allocate(*alignment, 64).expect_err("expected invalid alignment");
        assert_eq!(err.kind(), &ErrorKind::InvalidAlignment);
    }
}

#[test]
fn test_zero_sized_allocation() {
    let block = allocate(64, 0).expect("failed to allocate");

    assert!(block.len() >= 1);
    assert_eq!(block.addr() % 64, 0);

    release(Some(block));
}

#[test]
fn test_state_sized_allocation() {
    let mut block = allocate(64, size_of::<Small>()).expect("failed to allocate");
    assert_eq!(block.addr() % 64, 0);
    assert_eq!(block.len(), size_of::<Small>());

    block.zero();

    let report = Validator::default()
        .validate_at::<Small, _>(block.addr(), |c| {
            assert_eq!(c.address % 64, 0, "{} misaligned", c.path);
        })
        .expect("validation failed");

    assert_eq!(report.checks, Small::capacity().field_count());
}

#[test]
fn test_small_scenario() {
    let region = SharedRegion::<Small>::allocate().expect("failed to allocate");

    let mut passed = vec![];
    let report = Validator::default()
        .validate_with(region.get(), |c| {
            assert!(c.passed(), "{} failed", c.path);
            passed.push(c.path);
        })
        .expect("validation failed");

    // The root, every core, every memory socket and every link in both
    // directions.
    let mut required = vec![FieldPath::Root];
    required.extend((0..4).map(FieldPath::Core));
    required.extend((0..2).map(FieldPath::MemorySocket));
    for dir in &[Direction::Incoming, Direction::Outgoing] {
        for socket in 0..2 {
            for link in 0..3 {
                required.push(FieldPath::Link(*dir, socket, link));
            }
        }
    }
    assert_eq!(required.len(), 19);

    for path in &required {
        assert!(passed.contains(path), "{} not checked", path);
    }
    assert_eq!(report.checks, passed.len());
    assert_eq!(report.checks, 29);
}

#[test]
fn test_misaligned_base() {
    let block = allocate(64, size_of::<Small>() + 64).expect("failed to allocate");

    let mut checked = vec![];
    let err = Validator::default()
        .validate_at::<Small, _>(block.addr() + 1, |c| checked.push(*c))
        .expect_err("expected a layout violation");

    assert_eq!(err.kind(), &ErrorKind::LayoutViolation);
    assert_eq!(checked.len(), 1);
    assert_eq!(checked[0].path, FieldPath::Root);

    let violation = err.violation().expect("missing violation");
    assert_eq!(violation.path, FieldPath::Root);
    assert_eq!(violation.remainder, 1);
    assert!(err.to_string().contains("root"));
}

#[test]
fn test_released_block_does_not_affect_live_block() {
    let live = SharedRegion::<Small>::allocate().expect("failed to allocate");
    let other = SharedRegion::<Small>::allocate().expect("failed to allocate");

    let before = Validator::default().validate(live.get()).unwrap();
    release(Some(other.into_block()));
    let after = Validator::default().validate(live.get()).unwrap();

    assert_eq!(before, after);
}

#[test]
fn test_offset_query_by_name() {
    let path: FieldPath = "root.interconnect.incoming[1].links[2]".parse().unwrap();
    let offset = Small::offset_of(&path).expect("path out of range");

    assert_eq!(offset % CACHE_LINE_SIZE, 0);
    assert!(offset + 64 <= Small::size());

    let beyond: FieldPath = "root.core.cores[4]".parse().unwrap();
    assert_eq!(Small::offset_of(&beyond), None);
}

#[test]
fn test_production_layout() {
    let region = SharedRegion::<SharedPcmState>::allocate().expect("failed to allocate");

    let report = Validator::default()
        .validate(region.get())
        .expect("validation failed");

    assert_eq!(report.checks, PCM_ABI.capacity.field_count());
    assert_eq!(SharedPcmState::size() % CACHE_LINE_SIZE, 0);
}
