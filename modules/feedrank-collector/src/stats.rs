use crate::fuse::BatchSummary;

/// Stats from a collection run.
#[derive(Debug, Default, Clone)]
pub struct CollectStats {
    pub iterations: u32,
    pub scans: u32,
    pub failed_scans: u32,
    pub observed: u32,
    pub normalization_skips: u32,
    pub inserted: u32,
    pub replaced: u32,
    pub counters_raised: u32,
    pub kept_existing: u32,
    pub load_more_clicks: u32,
    pub rewinds: u32,
    pub structured_batches: u32,
    pub dropped_batches: u32,
}

impl CollectStats {
    pub fn absorb(&mut self, summary: &BatchSummary) {
        self.inserted += summary.inserted;
        self.replaced += summary.replaced;
        self.counters_raised += summary.counters_raised;
        self.kept_existing += summary.kept_existing;
    }
}

impl std::fmt::Display for CollectStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Collection Run Complete ===")?;
        writeln!(f, "Iterations:         {}", self.iterations)?;
        writeln!(f, "Scans:              {} ({} failed)", self.scans, self.failed_scans)?;
        writeln!(f, "Items observed:     {}", self.observed)?;
        writeln!(f, "Unparseable ids:    {}", self.normalization_skips)?;
        writeln!(f, "Structured batches: {} ({} dropped)", self.structured_batches, self.dropped_batches)?;
        writeln!(f, "\nMerges:")?;
        writeln!(f, "  Inserted:         {}", self.inserted)?;
        writeln!(f, "  Replaced:         {}", self.replaced)?;
        writeln!(f, "  Counters raised:  {}", self.counters_raised)?;
        writeln!(f, "  Kept existing:    {}", self.kept_existing)?;
        if self.load_more_clicks + self.rewinds > 0 {
            writeln!(f, "\nRecovery:")?;
            writeln!(f, "  Load-more clicks: {}", self.load_more_clicks)?;
            writeln!(f, "  Rewinds:          {}", self.rewinds)?;
        }
        Ok(())
    }
}
