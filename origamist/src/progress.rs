use std::ops::{Add, AddAssign};

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ProgressRecord {
    pub scans_read: usize,
    pub ions_extracted: usize,
    pub ions_skipped: usize,
    pub ions_out_of_range: usize,
    pub voltages_combined: usize,
    pub spectra_per_voltage: usize,
    pub overlays_built: usize,
}

impl Add for ProgressRecord {
    type Output = ProgressRecord;

    fn add(self, rhs: Self) -> Self::Output {
        let mut dup = self;
        dup += rhs;
        dup
    }
}

impl AddAssign for ProgressRecord {
    fn add_assign(&mut self, rhs: Self) {
        self.scans_read += rhs.scans_read;
        self.ions_extracted += rhs.ions_extracted;
        self.ions_skipped += rhs.ions_skipped;
        self.ions_out_of_range += rhs.ions_out_of_range;
        self.voltages_combined += rhs.voltages_combined;
        self.spectra_per_voltage += rhs.spectra_per_voltage;
        self.overlays_built += rhs.overlays_built;
    }
}
