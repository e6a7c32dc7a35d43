use crate::StagError;

/// Текущее Unix-время в миллисекундах.
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Little-endian байты → f32. Длина должна быть кратна 4.
pub fn bytes_to_f32(data: &[u8]) -> Result<Vec<f32>, StagError> {
    if data.len() % 4 != 0 {
        return Err(StagError::Shape(format!(
            "vertex buffer length {} is not divisible by 4",
            data.len()
        )));
    }
    Ok(data
        .chunks_exact(4)
        .map(|c| f32::from_bits(u32::from_le_bytes([c[0], c[1], c[2], c[3]])))
        .collect())
}

/// Little-endian байты → u32. Длина должна быть кратна 4.
pub fn bytes_to_u32(data: &[u8]) -> Result<Vec<u32>, StagError> {
    if data.len() % 4 != 0 {
        return Err(StagError::Shape(format!(
            "face buffer length {} is not divisible by 4",
            data.len()
        )));
    }
    Ok(data
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

pub fn f32_to_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_bits().to_le_bytes()).collect()
}

pub fn u32_to_bytes(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}
