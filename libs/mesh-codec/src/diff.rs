use stag_api::StagError;

/// Обратимый байтовый патч между двумя буферами.
///
/// Закон для любой реализации: `apply(base, diff(base, candidate))`
/// восстанавливает `candidate` (с точностью до паддинга нулями до длины
/// патча). На нём держится восстановление delta-записей при чтении.
pub trait DiffEngine: Send + Sync {
    fn diff(&self, base: &[u8], candidate: &[u8]) -> Vec<u8>;

    fn apply(&self, base: &[u8], patch: &[u8]) -> Result<Vec<u8>, StagError>;
}

/// Побайтовый XOR с паддингом нулями. Симметричный и самообратный.
///
/// Длина патча = `max(len(base), len(candidate))`, поэтому патч никогда
/// не короче candidate.
#[derive(Debug, Clone, Copy, Default)]
pub struct XorDiff;

fn xor_padded(a: &[u8], b: &[u8], len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| a.get(i).copied().unwrap_or(0) ^ b.get(i).copied().unwrap_or(0))
        .collect()
}

impl DiffEngine for XorDiff {
    fn diff(&self, base: &[u8], candidate: &[u8]) -> Vec<u8> {
        if base.is_empty() {
            return candidate.to_vec();
        }
        xor_padded(candidate, base, base.len().max(candidate.len()))
    }

    fn apply(&self, base: &[u8], patch: &[u8]) -> Result<Vec<u8>, StagError> {
        if base.is_empty() {
            return Ok(patch.to_vec());
        }
        Ok(xor_padded(patch, base, patch.len()))
    }
}
