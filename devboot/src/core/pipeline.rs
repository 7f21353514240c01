//! Commands as data: an ordered list of stages, each stage's stdout feeding the
//! next stage's stdin. A plain command is a one-stage pipeline.

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub program: String,
    pub args: Vec<String>,
}

impl Stage {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Build from an argument vector (`argv[0]` is the program).
    pub fn from_argv(argv: &[String]) -> Result<Self, EngineError> {
        let (program, args) = argv.split_first().ok_or_else(|| EngineError::InvalidCommand {
            reason: "empty argument vector".to_string(),
        })?;
        if program.trim().is_empty() {
            return Err(EngineError::InvalidCommand {
                reason: "blank program name".to_string(),
            });
        }
        Ok(Self::new(program.clone(), args.iter().cloned()))
    }

    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    stages: Vec<Stage>,
    merge_streams: bool,
}

impl Pipeline {
    pub fn new(stages: Vec<Stage>) -> Result<Self, EngineError> {
        if stages.is_empty() {
            return Err(EngineError::InvalidCommand {
                reason: "pipeline has no stages".to_string(),
            });
        }
        Ok(Self {
            stages,
            merge_streams: false,
        })
    }

    pub fn single(stage: Stage) -> Self {
        Self {
            stages: vec![stage],
            merge_streams: false,
        }
    }

    pub fn from_argv(argv: &[String]) -> Result<Self, EngineError> {
        Stage::from_argv(argv).map(Self::single)
    }

    /// Classify and capture every stage's stderr together with the final
    /// stdout, all tagged as stdout.
    pub fn merged(mut self) -> Self {
        self.merge_streams = true;
        self
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn merge_streams(&self) -> bool {
        self.merge_streams
    }

    /// Equivalent POSIX shell command line, for logs and operator guidance.
    pub fn render(&self) -> String {
        self.stages
            .iter()
            .map(|stage| {
                stage
                    .argv()
                    .into_iter()
                    .map(shell_quote)
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,@%+".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}
