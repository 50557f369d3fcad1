//! Resource Estimation
//!
//! Derives RAM and chunk-count guidance from the reference genome. This is
//! advisory sizing, not an enforced reservation: nothing is allocated, the
//! numbers only gate how the job is partitioned and whether the operator is
//! warned before proceeding.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use log::{info, warn};
use sysinfo::System;

use crate::error::PipelineError;

/// RAM required per GB of genome, empirically calibrated for the aligner
/// index plus working set.
const RAM_PER_GENOME_GB: f64 = 1.67;

/// Callback asked to approve running below the estimated RAM minimum.
/// Receives (required_gb, available_gb).
pub type ShortfallConfirm<'a> = &'a dyn Fn(u64, u64) -> bool;

/// Computes sizing guidance for one job from its reference genome.
pub struct ResourceEstimator {
    genome_bases: u64,
}

impl ResourceEstimator {
    /// Scans the genome reference and derives its size in bases.
    pub fn from_genome(genome: &Path) -> io::Result<Self> {
        let genome_bases = genome_size_bases(genome)?;
        info!(
            "Genome {} is {} bases (~{:.2} GB)",
            genome.display(),
            genome_bases,
            genome_bases as f64 / 1e9
        );
        Ok(Self { genome_bases })
    }

    /// Builds an estimator from a known base count (for tests and reuse).
    pub fn from_bases(genome_bases: u64) -> Self {
        Self { genome_bases }
    }

    /// Genome size in bases.
    pub fn genome_bases(&self) -> u64 {
        self.genome_bases
    }

    /// Minimum RAM in GB each chunk needs to hold the reference.
    pub fn min_ram_gb(&self) -> u64 {
        min_ram_gb(self.genome_bases)
    }

    /// Suggested chunk count when none is configured: how many minimum-RAM
    /// chunks fit in the available RAM concurrently, clamped to [1, CPUs].
    pub fn suggested_chunks(&self, available_ram_gb: u64) -> usize {
        let by_ram = (available_ram_gb / self.min_ram_gb().max(1)) as usize;
        by_ram.clamp(1, num_cpus::get())
    }

    /// Safe local parallelism: concurrent chunks bounded by RAM and CPUs.
    pub fn safe_parallelism(&self, available_ram_gb: u64) -> usize {
        self.suggested_chunks(available_ram_gb)
    }

    /// Verifies the per-chunk RAM budget against the estimated minimum.
    ///
    /// On shortfall the injected `confirm` callback is asked for explicit
    /// approval; with no callback (non-interactive contexts) the check
    /// aborts. Passing the check reserves nothing.
    pub fn check_ram(
        &self,
        available_per_chunk_gb: u64,
        confirm: Option<ShortfallConfirm>,
    ) -> Result<(), PipelineError> {
        let required = self.min_ram_gb();
        if available_per_chunk_gb >= required {
            return Ok(());
        }

        warn!(
            "Estimated minimum RAM per chunk is {} GB, only {} GB available",
            required, available_per_chunk_gb
        );

        match confirm {
            Some(confirm) if confirm(required, available_per_chunk_gb) => {
                warn!("Proceeding below the estimated RAM minimum on operator request");
                Ok(())
            }
            _ => Err(PipelineError::ResourceShortfall {
                required_gb: required,
                available_gb: available_per_chunk_gb,
            }),
        }
    }
}

/// Genome size in bases: file size minus header-line bytes and one byte per
/// header line. Sequence-line newlines count toward the size.
pub fn genome_size_bases(genome: &Path) -> io::Result<u64> {
    let file_size = genome.metadata()?.len();

    let reader = BufReader::new(File::open(genome)?);
    let mut header_bytes: u64 = 0;
    let mut header_count: u64 = 0;
    for line in reader.lines() {
        let line = line?;
        if line.starts_with('>') {
            header_bytes += line.len() as u64;
            header_count += 1;
        }
    }

    Ok(file_size.saturating_sub(header_bytes + header_count))
}

/// `min_ram_gb = floor(genome_gb × 1.67) + 1`.
pub fn min_ram_gb(genome_bases: u64) -> u64 {
    ((genome_bases as f64 / 1e9) * RAM_PER_GENOME_GB).floor() as u64 + 1
}

/// Total RAM of this host in GB, detected via sysinfo.
pub fn detected_ram_gb() -> u64 {
    let mut system = System::new();
    system.refresh_memory();
    system.total_memory() / (1024 * 1024 * 1024)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_min_ram_for_three_gigabase_genome() {
        // 3×10^9 bases → floor(3.0 × 1.67) + 1 = 6
        assert_eq!(min_ram_gb(3_000_000_000), 6);
    }

    #[test]
    fn test_min_ram_small_genome_floor() {
        assert_eq!(min_ram_gb(0), 1);
        assert_eq!(min_ram_gb(100_000_000), 1); // 0.167 → floor 0 + 1
        assert_eq!(min_ram_gb(1_000_000_000), 2); // 1.67 → floor 1 + 1
    }

    #[test]
    fn test_min_ram_non_decreasing() {
        let mut last = 0;
        for bases in (0..20_000_000_000u64).step_by(250_000_000) {
            let ram = min_ram_gb(bases);
            assert!(ram >= last, "min_ram_gb decreased at {} bases", bases);
            last = ram;
        }
    }

    #[test]
    fn test_genome_size_subtracts_headers() {
        let dir = tempdir().unwrap();
        let genome = dir.path().join("genome.fa");
        fs::write(&genome, ">chr1\nACGTACGT\n>chr2\nACGT\n").unwrap();

        // 26 file bytes - 10 header bytes - 2 header newlines = 14
        assert_eq!(genome_size_bases(&genome).unwrap(), 14);
    }

    #[test]
    fn test_genome_size_headerless_file() {
        let dir = tempdir().unwrap();
        let genome = dir.path().join("raw.txt");
        fs::write(&genome, "ACGT\nACGT\n").unwrap();

        assert_eq!(genome_size_bases(&genome).unwrap(), 10);
    }

    #[test]
    fn test_genome_size_missing_file() {
        assert!(genome_size_bases(Path::new("/nonexistent/genome.fa")).is_err());
    }

    #[test]
    fn test_suggested_chunks_bounds() {
        let estimator = ResourceEstimator::from_bases(3_000_000_000); // 6 GB min

        // Never below one chunk, even with no RAM to speak of.
        assert_eq!(estimator.suggested_chunks(0), 1);
        assert_eq!(estimator.suggested_chunks(5), 1);

        // Never above the CPU count.
        let cpus = num_cpus::get();
        assert!(estimator.suggested_chunks(6_000_000) <= cpus);
    }

    #[test]
    fn test_suggested_chunks_scales_with_ram() {
        let estimator = ResourceEstimator::from_bases(3_000_000_000); // 6 GB min
        let cpus = num_cpus::get();

        // 12 GB fits two 6 GB chunks, subject to the CPU clamp.
        assert_eq!(estimator.suggested_chunks(12), 2usize.min(cpus));
        assert!(estimator.suggested_chunks(24) >= estimator.suggested_chunks(12));
    }

    #[test]
    fn test_check_ram_sufficient() {
        let estimator = ResourceEstimator::from_bases(3_000_000_000);
        assert!(estimator.check_ram(6, None).is_ok());
        assert!(estimator.check_ram(64, None).is_ok());
    }

    #[test]
    fn test_check_ram_shortfall_aborts_without_confirmation() {
        let estimator = ResourceEstimator::from_bases(3_000_000_000);

        let result = estimator.check_ram(4, None);
        assert!(matches!(
            result,
            Err(PipelineError::ResourceShortfall {
                required_gb: 6,
                available_gb: 4
            })
        ));
    }

    #[test]
    fn test_check_ram_shortfall_confirmed() {
        let estimator = ResourceEstimator::from_bases(3_000_000_000);

        let approve = |_req: u64, _avail: u64| true;
        assert!(estimator.check_ram(4, Some(&approve)).is_ok());

        let decline = |_req: u64, _avail: u64| false;
        assert!(estimator.check_ram(4, Some(&decline)).is_err());
    }

    #[test]
    fn test_estimator_from_genome_file() {
        let dir = tempdir().unwrap();
        let genome = dir.path().join("genome.fa");
        fs::write(&genome, ">chr1\nACGTACGT\n").unwrap();

        let estimator = ResourceEstimator::from_genome(&genome).unwrap();
        assert_eq!(estimator.genome_bases(), 9); // 8 bases + 1 newline
        assert_eq!(estimator.min_ram_gb(), 1);
    }
}
