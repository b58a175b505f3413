mod block_cache;
mod file_reader;
mod range_reader;

pub use block_cache::{BlockCache, DEFAULT_BLOCK_SIZE, DEFAULT_CACHE_CAPACITY};
pub use file_reader::{LocalFileReader, MemoryReader};
pub use range_reader::{
    read_i32_le, read_i64_le, read_u16_be, read_u16_le, read_u32_be, read_u32_le, read_u64_be,
    read_u64_le, RangeReader,
};
