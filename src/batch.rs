//! Independent conversions of several books.
//!
//! Every job owns its input bytes, container and key, so jobs can run side
//! by side.  With the `parallel` feature they are spread over Rayon's global
//! pool; otherwise they run one after another in order.

use std::path::PathBuf;

use crate::stripper::{strip_file, Credential, StripError};

/// One input → output conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub input:  PathBuf,
    pub output: PathBuf,
}

/// Result of one [`Job`].
#[derive(Debug)]
pub struct JobReport {
    pub job:       Job,
    pub encrypted: bool,
    pub error:     Option<StripError>,
}

impl JobReport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

fn run(job: &Job, candidates: &[Credential]) -> JobReport {
    match strip_file(&job.input, &job.output, candidates) {
        Ok(s)  => JobReport { job: job.clone(), encrypted: s.was_encrypted(), error: None },
        Err(e) => JobReport { job: job.clone(), encrypted: false, error: Some(e) },
    }
}

/// Run all `jobs`; the reports come back in job order.
pub fn strip_many(jobs: &[Job], candidates: &[Credential]) -> Vec<JobReport> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        jobs.par_iter().map(|job| run(job, candidates)).collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        jobs.iter().map(|job| run(job, candidates)).collect()
    }
}
