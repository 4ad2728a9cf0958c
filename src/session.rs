//! A run of the interpreter over one or more sources.

use knot_syn::{parse_src, Parsed};
use knot_vm::{EvalError, Runtime, Special, Val};

use crate::diag::Diagnostic;

/// Why a source could not be run to completion.
#[derive(Debug, thiserror::Error)]
pub enum Failure {
    #[error("{path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("{0}")]
    Parse(Diagnostic),
    #[error("{diag}")]
    Eval { diag: Diagnostic, trace: Vec<String> },
    /// The program asked to exit.
    #[error("exit with status {0}")]
    Exit(i32),
}

impl Failure {
    /// The process exit status for this failure.
    pub fn status(&self) -> i32 {
        match self {
            Failure::Exit(status) => *status,
            _ => 1,
        }
    }

    /// Enclosing closure and macro frames, innermost first.
    pub fn trace(&self) -> &[String] {
        match self {
            Failure::Eval { trace, .. } => trace,
            _ => &[],
        }
    }
}

struct Source {
    path: String,
    text: String,
    /// Holding the parsed code keeps the addresses in its source map valid.
    parsed: Parsed,
}

/// Runs sources in order against one shared top-level environment.
pub struct Session {
    rt: Runtime,
    sources: Vec<Source>,
}

impl Session {
    pub fn new(rt: Runtime) -> Self {
        Session {
            rt,
            sources: vec![],
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.rt
    }

    pub fn runtime_mut(&mut self) -> &mut Runtime {
        &mut self.rt
    }

    pub fn run_file(&mut self, path: &str) -> Result<Val, Failure> {
        let text = std::fs::read_to_string(path).map_err(|source| Failure::Read {
            path: path.to_owned(),
            source,
        })?;
        self.run_source(path, text)
    }

    /// Parse and evaluate `text`, returning the value of its last form.
    pub fn run_source(
        &mut self,
        path: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<Val, Failure> {
        let (path, text) = (path.into(), text.into());
        tracing::debug!(%path, len = text.len(), "running source");

        let parsed = match parse_src(self.rt.syms_mut(), &path, &text) {
            Ok(parsed) => parsed,
            Err(e) => {
                let span = u32::from(e.span.start()) as usize..u32::from(e.span.end()) as usize;
                return Err(Failure::Parse(Diagnostic::at(&path, &text, span, e.to_string())));
            }
        };
        let forms = parsed.code.form_args(Special::Do).unwrap_or_default().to_vec();
        self.sources.push(Source { path, text, parsed });

        let mut result = Val::void();
        for (index, form) in forms.iter().enumerate() {
            result = self
                .rt
                .eval_form(form)
                .map_err(|e| self.eval_failure(e, index))?;
        }
        Ok(result)
    }

    /// `index` is the top-level form of the newest source that failed.
    fn eval_failure(&self, e: EvalError, index: usize) -> Failure {
        if let Some(status) = e.exit_status() {
            return Failure::Exit(status);
        }
        let message = e.to_string();
        let diag = self
            .locate(&e)
            .or_else(|| self.locate_top_level(index))
            .map(|(src, span)| Diagnostic::at(&src.path, &src.text, span, &message))
            .unwrap_or_else(|| {
                let path = self.sources.last().map_or("<unknown>", |s| s.path.as_str());
                Diagnostic::new(path, &message)
            });
        Failure::Eval {
            diag,
            trace: e.trace,
        }
    }

    fn locate_top_level(&self, index: usize) -> Option<(&Source, std::ops::Range<usize>)> {
        let src = self.sources.last()?;
        let span = src.parsed.locs.top_level(index)?;
        Some((src, u32::from(span.start()) as usize..u32::from(span.end()) as usize))
    }

    /// The innermost context form that came from a source.
    fn locate(&self, e: &EvalError) -> Option<(&Source, std::ops::Range<usize>)> {
        e.context.iter().find_map(|form| {
            self.sources.iter().rev().find_map(|src| {
                let span = src.parsed.locs.get(form)?;
                let range = u32::from(span.start()) as usize..u32::from(span.end()) as usize;
                Some((src, range))
            })
        })
    }
}
