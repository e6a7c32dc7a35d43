//! Кодирование mesh'ей в самоописываемый сжатый буфер и байтовые патчи
//! между такими буферами.

pub mod codec;
pub mod diff;

pub use codec::{
    DEFAULT_LEVEL, EncodedMesh, MAGIC, decode, encode, encode_mesh, is_already_encoded,
};
pub use diff::{DiffEngine, XorDiff};
