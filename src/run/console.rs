//! Terminal frontend for batch runs: questions are answered from the command
//! line, messages go to stderr, progress goes to the log.

use docio::core::buffers::BackgroundActivities;
use docio::core::error::FileError;
use docio::core::host::{Frontend, Question};
use tracing::info;

pub struct Console {
    assume_yes: bool,
    last_percent: Option<u64>,
}

impl Console {
    pub fn new(assume_yes: bool) -> Self {
        Self {
            assume_yes,
            last_percent: None,
        }
    }
}

impl Frontend for Console {
    fn confirm(&mut self, question: &Question) -> bool {
        let answer = if self.assume_yes { "yes" } else { "no" };
        match question {
            Question::LargeFile { path, size, limit } => eprintln!(
                "docio: {} is {} bytes, over the {} byte limit; open anyway? {}",
                path.display(),
                size,
                limit,
                answer
            ),
            Question::Reload { path, dirty } => eprintln!(
                "docio: {} changed on disk{}; reload? {}",
                path.display(),
                if *dirty { " and has unsaved changes" } else { "" },
                answer
            ),
            Question::Overwrite { path } => eprintln!(
                "docio: {} changed on disk since it was loaded; overwrite? {}",
                path.display(),
                answer
            ),
        }
        self.assume_yes
    }

    fn report(&mut self, error: &FileError) {
        eprintln!("docio: {}", error);
    }

    fn progress(&mut self, activities: &BackgroundActivities) {
        if activities.is_idle() {
            self.last_percent = None;
            return;
        }
        let percent = activities.percent();
        if self.last_percent != Some(percent) {
            self.last_percent = Some(percent);
            info!(
                target: "session",
                loaders = activities.loaders,
                storers = activities.storers,
                percent,
                file = activities.last_file.as_deref().unwrap_or(""),
                "background progress"
            );
        }
    }
}
