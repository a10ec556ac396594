use crate::*;

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

fn sample_tree() -> Value {
    Value::Sequence(vec![
        Value::Null,
        Value::Bool(true),
        Value::Number(-1.5),
        Value::Text("héllo".into()),
        Value::Mapping(vec![
            ("a".into(), Value::Placeholder(0)),
            ("b".into(), Value::Sequence(vec![])),
        ]),
    ])
}

#[test]
fn test_tree_roundtrip() -> Result<()> {
    let tree = sample_tree();
    let bytes = encode(&tree)?;
    assert_eq!(decode(&bytes)?, tree);
    Ok(())
}

#[test]
fn test_scalar_layout() -> Result<()> {
    assert_eq!(encode(&Value::Null)?, vec![0x00]);
    assert_eq!(encode(&Value::Bool(false))?, vec![0x02]);
    assert_eq!(encode(&Value::Placeholder(7))?, vec![0x0F, 7, 0, 0, 0]);

    let bytes = encode(&Value::Text("hi".into()))?;
    assert_eq!(bytes, vec![0x10, 2, 0, 0, 0, b'h', b'i']);
    Ok(())
}

#[test]
fn test_container_length_is_patched() -> Result<()> {
    let bytes = encode(&Value::Sequence(vec![Value::Null, Value::Bool(true)]))?;
    assert_eq!(bytes, vec![0x20, 2, 0, 0, 0, 0x00, 0x01]);
    Ok(())
}

#[test]
fn test_mapping_preserves_insertion_order() -> Result<()> {
    let tree = Value::Mapping(vec![
        ("z".into(), Value::from(1)),
        ("a".into(), Value::from(2)),
    ]);
    let decoded = decode(&encode(&tree)?)?;
    let Value::Mapping(entries) = decoded else { panic!("expected mapping") };
    assert_eq!(entries[0].0, "z");
    assert_eq!(entries[1].0, "a");
    Ok(())
}

#[test]
fn test_truncated_buffer() {
    let bytes = encode(&sample_tree()).unwrap();
    let err = decode(&bytes[..bytes.len() - 1]).unwrap_err();
    assert_eq!(err, Error::UnexpectedEnd);
}

#[test]
fn test_invalid_tag() {
    assert_eq!(decode(&[0xFF]).unwrap_err(), Error::InvalidTag(0xFF));
}

#[test]
fn test_trailing_bytes_rejected() {
    assert_eq!(decode(&[0x00, 0x00]).unwrap_err(), Error::TrailingBytes(1));
}

#[test]
fn test_invalid_utf8() {
    let bytes = vec![0x10, 1, 0, 0, 0, 0xC3];
    assert_eq!(decode(&bytes).unwrap_err(), Error::InvalidUtf8);
}

#[test]
fn test_mapping_key_must_be_text() {
    // Mapping body whose key is a Null
    let bytes = vec![0x21, 2, 0, 0, 0, 0x00, 0x00];
    assert_eq!(decode(&bytes).unwrap_err(), Error::InvalidTag(0x00));
}

#[test]
fn test_depth_limit_on_encode() {
    let mut tree = Value::Null;
    for _ in 0..=MAX_DEPTH {
        tree = Value::Sequence(vec![tree]);
    }
    assert_eq!(encode(&tree).unwrap_err(), Error::DepthExceeded);
}

#[test]
fn test_depth_limit_on_decode() {
    // Hand-build MAX_DEPTH + 1 nested sequences, innermost empty.
    let mut bytes: Vec<u8> = vec![0x20, 0, 0, 0, 0];
    for _ in 0..MAX_DEPTH {
        let mut outer = vec![0x20];
        outer.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        outer.extend_from_slice(&bytes);
        bytes = outer;
    }
    assert_eq!(decode(&bytes).unwrap_err(), Error::DepthExceeded);
}

#[test]
fn test_skip_moves_past_containers() -> Result<()> {
    let mut enc = Encoder::new();
    enc.value(&sample_tree())?;
    enc.number(42.0);
    let bytes = enc.into_bytes();

    let mut dec = Decoder::new(&bytes);
    dec.skip()?;
    assert_eq!(dec.peek_tag()?, Tag::Number);
    assert_eq!(dec.value()?, Value::Number(42.0));
    assert_eq!(dec.remaining(), 0);
    Ok(())
}

#[test]
fn test_encoder_buffer_grows_per_scalar() {
    let mut enc = Encoder::new();
    assert!(enc.as_bytes().is_empty());
    enc.null();
    assert_eq!(enc.as_bytes(), &[Tag::Null as u8]);
    enc.placeholder(7);
    assert_eq!(enc.as_bytes(), &[Tag::Null as u8, Tag::Placeholder as u8, 7, 0, 0, 0]);
    assert_eq!(enc.as_bytes().to_vec(), enc.into_bytes());
}

#[test]
fn test_text_transcoding() -> Result<()> {
    let bytes = encode(&sample_tree())?;
    let text = to_text(&bytes);
    assert!(text.is_ascii());
    assert_eq!(from_text(&text)?, bytes);
    Ok(())
}

#[test]
fn test_text_rejects_garbage() {
    assert!(matches!(from_text("not base64!"), Err(Error::InvalidText(_))));
}

fn random_tree(rng: &mut StdRng, depth: usize) -> Value {
    let kind = if depth == 0 { rng.gen_range(0..5) } else { rng.gen_range(0..7) };
    match kind {
        0 => Value::Null,
        1 => Value::Bool(rng.r#gen()),
        2 => Value::Number(rng.gen_range(-1e6..1e6)),
        3 => Value::Placeholder(rng.r#gen()),
        4 => Value::Text((0..rng.gen_range(0..8)).map(|_| rng.gen_range('a'..='z')).collect()),
        5 => Value::Sequence((0..rng.gen_range(0..4)).map(|_| random_tree(rng, depth - 1)).collect()),
        _ => Value::Mapping(
            (0..rng.gen_range(0..4))
                .map(|i| (format!("k{}", i), random_tree(rng, depth - 1)))
                .collect(),
        ),
    }
}

#[test]
fn test_random_trees_survive_the_wire() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..200 {
        let tree = random_tree(&mut rng, 4);
        assert_eq!(decode(&encode(&tree)?)?, tree);
    }
    Ok(())
}
