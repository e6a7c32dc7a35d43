use std::io::Read;

use stag_api::{DecodedMesh, Mesh, StagError, bytes_to_f32, bytes_to_u32};

/// Magic tag формата. Стоит в начале каждого закодированного payload'а
/// и в начале распакованного потока.
pub const MAGIC: [u8; 4] = *b"STAG";

/// Уровень gzip по умолчанию (максимальное сжатие).
pub const DEFAULT_LEVEL: u32 = 9;

/// magic + u32 vertex count + u32 face count
const HEADER_LEN: usize = 12;

// ════════════════════════════════════════════════════════════════
//  Encode
// ════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct EncodedMesh {
    /// `MAGIC ++ gzip(MAGIC ++ counts ++ vertices ++ faces)`.
    pub data: Vec<u8>,
    /// Байты vertices + faces (`4 * (len + len)`), без заголовка.
    pub original_size: usize,
    pub compressed_size: usize,
    /// `1 - compressed/original`; отрицательный для мелких/несжимаемых mesh'ей,
    /// `0.0` для пустого.
    pub ratio: f64,
}

/// `<= 0` → максимум, иначе clamp в допустимый для gzip диапазон 1..=9.
fn effective_level(level: i32) -> u32 {
    if level <= 0 {
        DEFAULT_LEVEL
    } else {
        (level as u32).clamp(1, 9)
    }
}

fn count_of(values: usize, what: &str) -> Result<u32, StagError> {
    if values % 3 != 0 {
        return Err(StagError::Shape(format!(
            "{what} length {values} is not divisible by 3"
        )));
    }
    u32::try_from(values)
        .map_err(|_| StagError::Shape(format!("{what} length {values} exceeds u32 range")))
}

/// Закодировать пару (vertices, faces) в самоописываемый сжатый буфер.
///
/// Vertices — плоский массив `[x, y, z, ...]`, faces — `[a, b, c, ...]`;
/// длина каждого должна быть кратна 3, иначе `StagError::Shape`.
pub fn encode(vertices: &[f32], faces: &[u32], level: i32) -> Result<EncodedMesh, StagError> {
    let vertex_count = count_of(vertices.len(), "vertices")?;
    let face_count = count_of(faces.len(), "faces")?;

    let mut raw = Vec::with_capacity(HEADER_LEN + 4 * (vertices.len() + faces.len()));
    raw.extend_from_slice(&MAGIC);
    raw.extend_from_slice(&vertex_count.to_le_bytes());
    raw.extend_from_slice(&face_count.to_le_bytes());
    for v in vertices {
        raw.extend_from_slice(&v.to_bits().to_le_bytes());
    }
    for f in faces {
        raw.extend_from_slice(&f.to_le_bytes());
    }

    // wire: внешний MAGIC перед gzip-потоком позволяет отличить закодированный
    // payload без распаковки; внутри gzip лежит ровно MAGIC ++ counts ++ vertices
    // ++ faces. decode принимает и голый gzip без внешнего тега.
    let level = effective_level(level);
    let mut data = MAGIC.to_vec();
    let mut encoder = flate2::read::GzEncoder::new(&raw[..], flate2::Compression::new(level));
    encoder
        .read_to_end(&mut data)
        .map_err(|e| StagError::Format(format!("gzip compress: {e}")))?;

    let original_size = raw.len() - HEADER_LEN;
    let compressed_size = data.len();
    let ratio = if original_size == 0 {
        0.0
    } else {
        1.0 - compressed_size as f64 / original_size as f64
    };

    tracing::debug!(
        vertices = vertex_count,
        faces = face_count,
        level,
        original_size,
        compressed_size,
        ratio,
        "encoded mesh"
    );

    Ok(EncodedMesh {
        data,
        original_size,
        compressed_size,
        ratio,
    })
}

/// Закодировать mesh в wire-форме (little-endian байты f32/u32).
/// `default_level` применяется, если у mesh'а `compression_level <= 0`.
pub fn encode_mesh(mesh: &Mesh, default_level: i32) -> Result<EncodedMesh, StagError> {
    let level = if mesh.compression_level > 0 {
        mesh.compression_level
    } else {
        default_level
    };
    let vertices = bytes_to_f32(&mesh.vertices)?;
    let faces = bytes_to_u32(&mesh.faces)?;
    encode(&vertices, &faces, level)
}

/// Payload уже в нашем формате? Проверяет только префикс, не распаковывая.
pub fn is_already_encoded(buffer: &[u8]) -> bool {
    buffer.starts_with(&MAGIC)
}

// ════════════════════════════════════════════════════════════════
//  Decode
// ════════════════════════════════════════════════════════════════

fn read_u32(raw: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([raw[offset], raw[offset + 1], raw[offset + 2], raw[offset + 3]])
}

/// Распаковать буфер, произведённый `encode`.
///
/// Принимает также голый gzip-поток без внешнего тега. Любая порча
/// (не распаковывается, короткий заголовок, чужой magic, обрезанные
/// данные) даёт `StagError::Format`, никогда не panic.
pub fn decode(buffer: &[u8]) -> Result<DecodedMesh, StagError> {
    let stream = buffer.strip_prefix(MAGIC.as_slice()).unwrap_or(buffer);

    let mut raw = Vec::new();
    flate2::read::GzDecoder::new(stream)
        .read_to_end(&mut raw)
        .map_err(|e| StagError::Format(format!("gzip decompress: {e}")))?;

    if raw.len() < HEADER_LEN {
        return Err(StagError::Format(format!(
            "decoded stream too short: {} bytes",
            raw.len()
        )));
    }
    if raw[..4] != MAGIC {
        return Err(StagError::Format(format!(
            "invalid header: {:?}",
            String::from_utf8_lossy(&raw[..4])
        )));
    }

    let vertex_count = read_u32(&raw, 4) as usize;
    let face_count = read_u32(&raw, 8) as usize;
    if vertex_count % 3 != 0 || face_count % 3 != 0 {
        return Err(StagError::Format(format!(
            "header counts {vertex_count}/{face_count} are not whole points/triangles"
        )));
    }

    let body = &raw[HEADER_LEN..];
    let expected = vertex_count
        .checked_add(face_count)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| StagError::Format("header counts overflow".into()))?;
    if body.len() < expected {
        return Err(StagError::Format(format!(
            "truncated payload: header declares {expected} bytes, stream holds {}",
            body.len()
        )));
    }
    if body.len() > expected {
        return Err(StagError::Format(format!(
            "{} trailing bytes after mesh data",
            body.len() - expected
        )));
    }

    let (vertex_bytes, face_bytes) = body.split_at(vertex_count * 4);
    Ok(DecodedMesh {
        vertices: bytes_to_f32(vertex_bytes)?,
        faces: bytes_to_u32(face_bytes)?,
        success: true,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use proptest::prelude::*;
    use stag_api::{ErrorKind, f32_to_bytes, u32_to_bytes};

    use super::*;

    fn gzip(raw: &[u8]) -> Vec<u8> {
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(raw).unwrap();
        enc.finish().unwrap()
    }

    fn raw_stream(magic: &[u8], vertex_count: u32, face_count: u32, body: &[u8]) -> Vec<u8> {
        let mut raw = magic.to_vec();
        raw.extend_from_slice(&vertex_count.to_le_bytes());
        raw.extend_from_slice(&face_count.to_le_bytes());
        raw.extend_from_slice(body);
        raw
    }

    fn quad() -> (Vec<f32>, Vec<u32>) {
        (
            vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0],
            vec![0, 1, 2, 0, 2, 3],
        )
    }

    #[test]
    fn encoded_buffer_starts_with_magic() {
        let (v, f) = quad();
        let encoded = encode(&v, &f, 7).unwrap();
        assert!(is_already_encoded(&encoded.data));
        assert_eq!(encoded.compressed_size, encoded.data.len());
        assert_eq!(encoded.original_size, 4 * (v.len() + f.len()));
    }

    #[test]
    fn empty_mesh_has_zero_size_and_ratio() {
        let encoded = encode(&[], &[], 9).unwrap();
        assert_eq!(encoded.original_size, 0);
        assert_eq!(encoded.ratio, 0.0);
    }

    #[test]
    fn tiny_mesh_has_negative_ratio() {
        let encoded = encode(&[1.0, 2.0, 3.0], &[], 9).unwrap();
        assert!(encoded.ratio < 0.0);
    }

    #[test]
    fn level_out_of_range_is_clamped() {
        let (v, f) = quad();
        assert_eq!(encode(&v, &f, 0).unwrap(), encode(&v, &f, 9).unwrap());
        assert_eq!(encode(&v, &f, -4).unwrap(), encode(&v, &f, 9).unwrap());
        assert_eq!(encode(&v, &f, 42).unwrap(), encode(&v, &f, 9).unwrap());
    }

    #[test]
    fn empty_mesh_round_trips() {
        let decoded = decode(&encode(&[], &[], 5).unwrap().data).unwrap();
        assert!(decoded.vertices.is_empty());
        assert!(decoded.faces.is_empty());
        assert!(decoded.success);
    }

    #[test]
    fn shape_errors_for_partial_points_and_triangles() {
        for len in [1usize, 2, 4, 5] {
            let err = encode(&vec![0.0; len], &[], 5).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Shape, "vertices len {len}");
            let err = encode(&[], &vec![0; len], 5).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Shape, "faces len {len}");
        }
    }

    #[test]
    fn encode_mesh_reads_wire_bytes() {
        let (v, f) = quad();
        let mesh = Mesh {
            vertices: f32_to_bytes(&v),
            faces: u32_to_bytes(&f),
            compression_level: 3,
            ..Default::default()
        };
        let encoded = encode_mesh(&mesh, 9).unwrap();
        assert_eq!(encoded, encode(&v, &f, 3).unwrap());
        let decoded = decode(&encoded.data).unwrap();
        assert_eq!(decoded.vertices, v);
        assert_eq!(decoded.faces, f);

        let unleveled = Mesh {
            compression_level: 0,
            ..mesh
        };
        assert_eq!(encode_mesh(&unleveled, 1).unwrap(), encode(&v, &f, 1).unwrap());

        let ragged = Mesh {
            vertices: vec![0; 7],
            ..Default::default()
        };
        assert_eq!(encode_mesh(&ragged, 9).unwrap_err().kind(), ErrorKind::Shape);
    }

    #[test]
    fn garbage_is_a_format_error() {
        let cases: [&[u8]; 4] = [b"", b"STAG", b"not gzip at all", b"STAG\x1f\x8b\x08garbage"];
        for buf in cases {
            assert_eq!(decode(buf).unwrap_err().kind(), ErrorKind::Format, "{buf:?}");
        }
    }

    #[test]
    fn foreign_magic_is_rejected() {
        let buf = gzip(&raw_stream(b"DRCO", 0, 0, &[]));
        let err = decode(&buf).unwrap_err();
        assert!(matches!(err, StagError::Format(ref m) if m.contains("invalid header")));
    }

    #[test]
    fn short_stream_is_rejected() {
        let buf = gzip(b"STAG\x03\x00");
        assert_eq!(decode(&buf).unwrap_err().kind(), ErrorKind::Format);
    }

    #[test]
    fn count_beyond_stream_is_truncation_not_panic() {
        let body = f32_to_bytes(&[1.0, 2.0, 3.0]);
        let buf = gzip(&raw_stream(&MAGIC, 3_000_000, 0, &body));
        let err = decode(&buf).unwrap_err();
        assert!(matches!(err, StagError::Format(ref m) if m.contains("truncated")));

        let huge = gzip(&raw_stream(&MAGIC, u32::MAX - 2, u32::MAX - 2, &[]));
        assert_eq!(decode(&huge).unwrap_err().kind(), ErrorKind::Format);
    }

    #[test]
    fn bare_gzip_stream_without_outer_tag_decodes() {
        let (v, f) = quad();
        let mut body = f32_to_bytes(&v);
        body.extend(u32_to_bytes(&f));
        let buf = gzip(&raw_stream(&MAGIC, v.len() as u32, f.len() as u32, &body));
        assert!(!is_already_encoded(&buf));

        let decoded = decode(&buf).unwrap();
        assert_eq!(decoded.vertices, v);
        assert_eq!(decoded.faces, f);
    }

    #[test]
    fn zero_padding_after_gzip_member_is_ignored() {
        let (v, f) = quad();
        let mut data = encode(&v, &f, 6).unwrap().data;
        data.extend_from_slice(&[0u8; 16]);
        assert_eq!(decode(&data).unwrap().vertices, v);
    }

    fn mesh_strategy() -> impl Strategy<Value = (Vec<f32>, Vec<u32>)> {
        (
            prop::collection::vec(any::<[u32; 3]>(), 0..48),
            prop::collection::vec(any::<[u32; 3]>(), 0..48),
        )
            .prop_map(|(points, triangles)| {
                let vertices: Vec<f32> =
                    points.iter().flatten().map(|b| f32::from_bits(*b)).collect();
                let faces: Vec<u32> = triangles.into_iter().flatten().collect();
                (vertices, faces)
            })
    }

    proptest! {
        #[test]
        fn round_trip_is_bit_exact((vertices, faces) in mesh_strategy(), level in -1i32..=10) {
            let encoded = encode(&vertices, &faces, level).unwrap();
            let decoded = decode(&encoded.data).unwrap();

            let bits: Vec<u32> = vertices.iter().map(|v| v.to_bits()).collect();
            let decoded_bits: Vec<u32> = decoded.vertices.iter().map(|v| v.to_bits()).collect();
            prop_assert_eq!(bits, decoded_bits);
            prop_assert_eq!(decoded.faces, faces);
        }

        #[test]
        fn non_multiple_of_three_is_shape_error(len in 0usize..64) {
            prop_assume!(len % 3 != 0);
            prop_assert_eq!(encode(&vec![0.5; len], &[], 5).unwrap_err().kind(), ErrorKind::Shape);
            prop_assert_eq!(encode(&[], &vec![1; len], 5).unwrap_err().kind(), ErrorKind::Shape);
        }
    }
}
