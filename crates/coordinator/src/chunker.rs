//! File decomposition: byte-range splitting into fixed-size chunks.
//!
//! Purely a function of (bytes, chunk size); no shared state.

use chunknet_common::Chunk;

/// Split `data` into sequentially-numbered chunks of `chunk_size_bytes`,
/// the last chunk possibly smaller. Chunk ids are `"{name}_chunk_{index}"`.
///
/// Concatenating the chunk payloads in index order reproduces `data`
/// exactly; the chunk count is `ceil(len / chunk_size_bytes)`.
pub fn split_into_chunks(name: &str, data: &[u8], chunk_size_bytes: usize) -> Vec<Chunk> {
    assert!(chunk_size_bytes > 0, "chunk size must be positive");

    data.chunks(chunk_size_bytes)
        .enumerate()
        .map(|(index, slice)| Chunk::new(chunk_id(name, index), slice.to_vec()))
        .collect()
}

/// Canonical chunk id for `name` at `index`.
pub fn chunk_id(name: &str, index: usize) -> String {
    format!("{}_chunk_{}", name, index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_count_is_ceiling() {
        let data = vec![0u8; 10];
        assert_eq!(split_into_chunks("f", &data, 4).len(), 3);
        assert_eq!(split_into_chunks("f", &data, 5).len(), 2);
        assert_eq!(split_into_chunks("f", &data, 10).len(), 1);
        assert_eq!(split_into_chunks("f", &data, 11).len(), 1);
    }

    #[test]
    fn test_empty_input_yields_no_chunks() {
        assert!(split_into_chunks("f", &[], 4).is_empty());
    }

    #[test]
    fn test_chunk_ids_are_sequential() {
        let data = vec![0u8; 9];
        let chunks = split_into_chunks("report.pdf", &data, 4);
        let ids: Vec<&str> = chunks.iter().map(Chunk::chunk_id).collect();
        assert_eq!(
            ids,
            vec![
                "report.pdf_chunk_0",
                "report.pdf_chunk_1",
                "report.pdf_chunk_2"
            ]
        );
    }

    #[test]
    fn test_last_chunk_may_be_short() {
        let data: Vec<u8> = (0..10).collect();
        let chunks = split_into_chunks("f", &data, 4);
        assert_eq!(chunks[0].size_bytes(), 4);
        assert_eq!(chunks[1].size_bytes(), 4);
        assert_eq!(chunks[2].size_bytes(), 2);
    }

    #[test]
    fn test_concatenation_reproduces_input() {
        let data: Vec<u8> = (0..=255).cycle().take(1000).collect();
        for chunk_size in [1, 3, 7, 64, 999, 1000, 2000] {
            let chunks = split_into_chunks("f", &data, chunk_size);
            let rebuilt: Vec<u8> = chunks
                .iter()
                .flat_map(|c| c.data().to_vec())
                .collect();
            assert_eq!(rebuilt, data, "chunk size {}", chunk_size);
        }
    }
}
