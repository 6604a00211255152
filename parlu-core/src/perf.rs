use std::time::{Duration, Instant};

#[derive(Debug, Copy, Clone)]
pub enum PerfSection {
    Validate,
    Matching,
    Ordering,
    Symbolic,
    Scaling,
    Numeric,
    Solve,
    Refinement,
}

#[derive(Debug, Default, Clone)]
pub struct PerfTimers {
    pub validate: Duration,
    pub matching: Duration,
    pub ordering: Duration,
    pub symbolic: Duration,
    pub scaling: Duration,
    pub numeric: Duration,
    pub solve: Duration,
    pub refinement: Duration,
}

impl PerfTimers {
    pub fn scoped<'a>(&'a mut self, section: PerfSection) -> PerfGuard<'a> {
        PerfGuard { section, start: Instant::now(), timers: self }
    }

    pub fn add(&mut self, section: PerfSection, dt: Duration) {
        match section {
            PerfSection::Validate => self.validate += dt,
            PerfSection::Matching => self.matching += dt,
            PerfSection::Ordering => self.ordering += dt,
            PerfSection::Symbolic => self.symbolic += dt,
            PerfSection::Scaling => self.scaling += dt,
            PerfSection::Numeric => self.numeric += dt,
            PerfSection::Solve => self.solve += dt,
            PerfSection::Refinement => self.refinement += dt,
        }
    }

    /// One-line summary in milliseconds.
    pub fn summary(&self) -> String {
        let ms = |d: Duration| d.as_secs_f64() * 1e3;
        format!(
            "validate={:.3}ms matching={:.3}ms ordering={:.3}ms symbolic={:.3}ms scaling={:.3}ms numeric={:.3}ms solve={:.3}ms refine={:.3}ms",
            ms(self.validate),
            ms(self.matching),
            ms(self.ordering),
            ms(self.symbolic),
            ms(self.scaling),
            ms(self.numeric),
            ms(self.solve),
            ms(self.refinement),
        )
    }
}

pub struct PerfGuard<'a> {
    section: PerfSection,
    start: Instant,
    timers: &'a mut PerfTimers,
}

impl Drop for PerfGuard<'_> {
    fn drop(&mut self) {
        self.timers.add(self.section, self.start.elapsed());
    }
}
