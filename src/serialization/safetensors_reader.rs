use half::{bf16, f16};

use super::{SafeTensorsDType, SafeTensorsMetadata, TensorMetadata, UserMetadata};

pub(super) fn validate_and_read_header(bytes: &[u8]) -> Result<usize, String> {
    let Some(header_bytes) = bytes.get(..8).and_then(|b| <[u8; 8]>::try_from(b).ok()) else {
        return Err(format!(
            "Invalid SafeTensors file: file is {} bytes, need at least 8 bytes for header",
            bytes.len()
        ));
    };
    let metadata_len = usize::try_from(u64::from_le_bytes(header_bytes))
        .map_err(|_| "Invalid SafeTensors file: metadata length overflows".to_string())?;

    if metadata_len == 0 {
        return Err("Invalid SafeTensors file: metadata length is 0".to_string());
    }

    if metadata_len > bytes.len() - 8 {
        return Err(format!(
            "Invalid SafeTensors file: metadata length {metadata_len} exceeds file size"
        ));
    }

    Ok(metadata_len)
}

pub(super) fn parse_metadata(
    bytes: &[u8],
    metadata_len: usize,
) -> Result<(SafeTensorsMetadata, UserMetadata), String> {
    let metadata_json = &bytes[8..8 + metadata_len];
    let metadata_str = std::str::from_utf8(metadata_json)
        .map_err(|e| format!("Metadata is not valid UTF-8: {e}"))?;

    let raw_metadata: serde_json::Value =
        serde_json::from_str(metadata_str).map_err(|e| format!("JSON parsing failed: {e}"))?;

    let serde_json::Value::Object(map) = raw_metadata else {
        return Err("Invalid SafeTensors file: header is not a JSON object".to_string());
    };

    let mut metadata = SafeTensorsMetadata::new();
    let mut user_metadata = UserMetadata::new();

    for (key, value) in map {
        if key == "__metadata__" {
            extract_user_metadata(value, &mut user_metadata);
            continue;
        }
        if key.starts_with("__") {
            continue;
        }
        let tensor_meta = serde_json::from_value::<TensorMetadata>(value)
            .map_err(|e| format!("Invalid metadata for tensor '{key}': {e}"))?;
        metadata.insert(key, tensor_meta);
    }

    Ok((metadata, user_metadata))
}

fn extract_user_metadata(value: serde_json::Value, user_metadata: &mut UserMetadata) {
    let serde_json::Value::Object(meta_map) = value else {
        return;
    };
    for (mk, mv) in meta_map {
        if let serde_json::Value::String(s) = mv {
            user_metadata.insert(mk, s);
        }
    }
}

/// Extracts a tensor from raw `SafeTensors` data.
///
/// # Returns
///
/// Vector of F32 values (BF16/F16 are converted to F32)
///
/// # Errors
///
/// Returns an error if:
/// - Data offsets are invalid
/// - Data size doesn't match the dtype and shape
/// - Unsupported dtype
pub fn extract_tensor(raw_data: &[u8], tensor_meta: &TensorMetadata) -> Result<Vec<f32>, String> {
    let [start, end] = tensor_meta.data_offsets;

    if end > raw_data.len() {
        return Err(format!(
            "Invalid data offset: end={} exceeds data size={}",
            end,
            raw_data.len()
        ));
    }
    if start > end {
        return Err(format!("Invalid data offset: start={start} > end={end}"));
    }

    let dtype = SafeTensorsDType::parse(&tensor_meta.dtype)?;
    let numel: usize = tensor_meta.shape.iter().product();
    let tensor_bytes = &raw_data[start..end];
    if tensor_bytes.len() != numel * dtype.bytes_per_element() {
        return Err(format!(
            "Invalid {} tensor data: {} bytes for shape {:?}",
            tensor_meta.dtype,
            tensor_bytes.len(),
            tensor_meta.shape
        ));
    }

    let values = match dtype {
        SafeTensorsDType::F32 => tensor_bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
        SafeTensorsDType::F16 => tensor_bytes
            .chunks_exact(2)
            .map(|c| f16::from_le_bytes([c[0], c[1]]).to_f32())
            .collect(),
        SafeTensorsDType::BF16 => tensor_bytes
            .chunks_exact(2)
            .map(|c| bf16::from_le_bytes([c[0], c[1]]).to_f32())
            .collect(),
    };
    Ok(values)
}
