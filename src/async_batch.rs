//! Async batch processing module
//!
//! This module rebuilds many ROM images concurrently. Each rebuild is still
//! single-threaded; only independent files are processed in parallel.

#[cfg(feature = "async")]
/// Concurrent ROM processing with a configurable concurrency limit
pub mod processor {
    use crate::async_convenience::decompress_rom_async;
    use crate::{RebuildStats, Result, RomOptions};
    use futures::stream::{self, StreamExt, TryStreamExt};
    use std::path::{Path, PathBuf};

    /// Concurrent ROM processor
    #[derive(Debug, Clone)]
    pub struct AsyncBatchProcessor {
        concurrency_limit: usize,
        options: RomOptions,
        fix_checksum: bool,
    }

    impl AsyncBatchProcessor {
        /// Create a new batch processor with default settings
        pub fn new() -> Self {
            Self {
                concurrency_limit: num_cpus::get(),
                options: RomOptions::default(),
                fix_checksum: true,
            }
        }

        /// Set the concurrency limit
        pub fn with_concurrency(mut self, limit: usize) -> Self {
            self.concurrency_limit = limit.max(1);
            self
        }

        /// Set the rebuild options applied to every ROM
        pub fn with_options(mut self, options: RomOptions) -> Self {
            self.options = options;
            self
        }

        /// Enable or disable header checksum repair
        pub fn with_checksum(mut self, fix_checksum: bool) -> Self {
            self.fix_checksum = fix_checksum;
            self
        }

        /// Rebuild several ROMs held in memory; results keep input order
        pub async fn decompress_roms(&self, roms: Vec<Vec<u8>>) -> Result<Vec<Vec<u8>>> {
            self.options.validate()?;
            stream::iter(roms.into_iter().map(|rom| {
                let options = self.options.clone();
                let fix_checksum = self.fix_checksum;
                async move {
                    decompress_rom_async(rom, options, fix_checksum)
                        .await
                        .map(|image| image.data)
                }
            }))
            .buffered(self.concurrency_limit)
            .try_collect()
            .await
        }

        /// Rebuild each `(input, output)` pair; results arrive as they complete
        pub async fn decompress_files<P: AsRef<Path> + Send + Sync>(
            &self,
            files: Vec<(P, P)>,
        ) -> Result<Vec<(PathBuf, RebuildStats)>> {
            self.options.validate()?;
            let results = stream::iter(files.into_iter().map(|(input, output)| {
                let processor = self.clone();
                async move { processor.decompress_single_file(input, output).await }
            }))
            .buffer_unordered(self.concurrency_limit)
            .try_collect()
            .await?;

            Ok(results)
        }

        async fn decompress_single_file<P: AsRef<Path>>(
            &self,
            input: P,
            output: P,
        ) -> Result<(PathBuf, RebuildStats)> {
            let rom = tokio::fs::read(input.as_ref()).await?;
            let image = decompress_rom_async(rom, self.options.clone(), self.fix_checksum).await?;
            tokio::fs::write(output.as_ref(), &image.data).await?;
            Ok((output.as_ref().to_path_buf(), image.stats))
        }
    }

    impl Default for AsyncBatchProcessor {
        fn default() -> Self {
            Self::new()
        }
    }
}

#[cfg(feature = "async")]
pub use processor::AsyncBatchProcessor;

#[cfg(all(test, feature = "async"))]
mod tests {
    use super::*;
    use crate::{RomOptions, TableLayout, Z64Error};

    #[tokio::test]
    async fn test_invalid_options_fail_fast() {
        let processor = AsyncBatchProcessor::new()
            .with_concurrency(2)
            .with_options(RomOptions::new().with_layout(TableLayout::DmaExt));
        assert!(matches!(
            processor.decompress_roms(vec![vec![0u8; 16]]).await,
            Err(Z64Error::IncompatibleOptions(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_table_reported() {
        let processor = AsyncBatchProcessor::new().with_checksum(false);
        let result = processor
            .decompress_roms(vec![vec![0u8; 0x100], vec![0u8; 0x200]])
            .await;
        assert!(matches!(result, Err(Z64Error::StructureNotFound(_))));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let processor = AsyncBatchProcessor::default();
        assert!(processor.decompress_roms(Vec::new()).await.unwrap().is_empty());
        let files: Vec<(String, String)> = Vec::new();
        assert!(processor.decompress_files(files).await.unwrap().is_empty());
    }
}
