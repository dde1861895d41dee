use super::*;
use half::{bf16, f16};

fn one_tensor(name: &str, data: Vec<f32>, shape: Vec<usize>) -> BTreeMap<String, (Vec<f32>, Vec<usize>)> {
    let mut tensors = BTreeMap::new();
    tensors.insert(name.to_string(), (data, shape));
    tensors
}

/// Hand-assemble a file with one tensor of the given dtype.
fn write_raw(path: &Path, dtype: &str, shape: &[usize], payload: &[u8]) {
    let header = format!(
        r#"{{"__metadata__":{{"format":"pt"}},"w":{{"dtype":"{dtype}","shape":{shape:?},"data_offsets":[0,{}]}}}}"#,
        payload.len()
    );
    let mut bytes = (header.len() as u64).to_le_bytes().to_vec();
    bytes.extend_from_slice(header.as_bytes());
    bytes.extend_from_slice(payload);
    fs::write(path, bytes).expect("write fixture");
}

#[test]
fn test_save_and_load() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("model.safetensors");

    let mut tensors = one_tensor("conv.weight", vec![1.0, -2.0, 3.5, 0.25], vec![2, 2]);
    tensors.insert("conv.bias".to_string(), (vec![0.5, 0.75], vec![2]));
    save_safetensors(&path, &tensors).expect("save");

    let (metadata, raw) = load_safetensors(&path).expect("load");
    assert_eq!(metadata.len(), 2);

    let weight = &metadata["conv.weight"];
    assert_eq!(weight.dtype, "F32");
    assert_eq!(weight.shape, vec![2, 2]);
    assert_eq!(extract_tensor(&raw, weight).expect("extract"), vec![1.0, -2.0, 3.5, 0.25]);
    assert_eq!(extract_tensor(&raw, &metadata["conv.bias"]).expect("extract"), vec![0.5, 0.75]);
}

#[test]
fn test_user_metadata_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("meta.safetensors");

    let mut user = UserMetadata::new();
    user.insert("format".to_string(), "pt".to_string());
    save_safetensors_with_metadata(&path, &one_tensor("x", vec![1.0], vec![1]), &user)
        .expect("save");

    let (metadata, user_metadata, _) = load_safetensors_with_metadata(&path).expect("load");
    assert_eq!(metadata.len(), 1);
    assert_eq!(user_metadata.get("format").map(String::as_str), Some("pt"));
}

#[test]
fn test_save_rejects_inconsistent_shape() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = save_safetensors(dir.path().join("bad.safetensors"), &one_tensor("x", vec![1.0; 3], vec![2, 2]))
        .expect_err("3 values for a 2x2 tensor");
    assert!(err.contains("shape"));
}

#[test]
fn test_read_f16() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("half.safetensors");

    let payload: Vec<u8> = [1.5f32, -0.25]
        .iter()
        .flat_map(|&v| f16::from_f32(v).to_le_bytes())
        .collect();
    write_raw(&path, "F16", &[2], &payload);

    let (metadata, raw) = load_safetensors(&path).expect("load");
    assert_eq!(extract_tensor(&raw, &metadata["w"]).expect("extract"), vec![1.5, -0.25]);
}

#[test]
fn test_read_bf16() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("bf16.safetensors");

    let payload: Vec<u8> = [2.0f32, -8.0]
        .iter()
        .flat_map(|&v| bf16::from_f32(v).to_le_bytes())
        .collect();
    write_raw(&path, "BF16", &[1, 2], &payload);

    let (metadata, raw) = load_safetensors(&path).expect("load");
    assert_eq!(extract_tensor(&raw, &metadata["w"]).expect("extract"), vec![2.0, -8.0]);
}

#[test]
fn test_unsupported_dtype() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("int.safetensors");
    write_raw(&path, "I64", &[1], &[0; 8]);

    let (metadata, raw) = load_safetensors(&path).expect("header parses");
    let err = extract_tensor(&raw, &metadata["w"]).expect_err("I64 is unsupported");
    assert!(err.contains("Unsupported dtype"));
}

#[test]
fn test_payload_size_must_match_shape() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("short.safetensors");
    write_raw(&path, "F32", &[3], &[0; 8]);

    let (metadata, raw) = load_safetensors(&path).expect("header parses");
    assert!(extract_tensor(&raw, &metadata["w"]).is_err());
}

#[test]
fn test_truncated_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("tiny.safetensors");
    fs::write(&path, [1, 2, 3]).expect("write");
    let err = load_safetensors(&path).expect_err("3-byte file");
    assert!(err.contains("need at least 8 bytes"));

    fs::write(&path, 100u64.to_le_bytes()).expect("write");
    let err = load_safetensors(&path).expect_err("header longer than file");
    assert!(err.contains("exceeds file size"));
}

#[test]
fn test_missing_file() {
    let err = load_safetensors("/nonexistent/aprender-vae/model.safetensors").expect_err("no file");
    assert!(err.contains("File read failed"));
}
