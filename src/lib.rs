pub mod header;
pub mod codec;
pub mod block;
pub mod chunk;
pub mod io_stream;

pub use header::{ChunkHeader, Variant, CHNK_MAGIC};
pub use codec::{CompressionType, get_codec, inflate_block, deflate_block};
pub use block::{Block, TableRecord, COMPRESSED_FLAG};
pub use chunk::{Chunk, ChunkError, ChunkInfo, PackOptions, decompress_chunk_file};
