//! Plain-text explicit MDP files.
//!
//! ```text
//! # comment
//! states 3
//! initial 0
//! 0 -> 0.9:1 0.1:2
//! 0 -> 0.1:1 0.9:2
//! goal 1
//! ```
//!
//! Each `from -> p:to ...` line adds one choice to state `from`.

use smdp_model::models::ExplicitMdp;
use std::ops::Range;
use thiserror::Error;

const TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Error, PartialEq)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
    /// Byte range of the offending text.
    pub span: Range<usize>,
}

fn error(message: impl Into<String>, span: Range<usize>) -> ParseError {
    ParseError {
        message: message.into(),
        span,
    }
}

/// A parsed model and the states the reachability property aims for.
#[derive(Debug, Clone)]
pub struct ModelFile {
    pub mdp: ExplicitMdp,
    pub goals: Vec<usize>,
}

/// Whitespace-separated tokens of `line` with their absolute offsets.
fn tokens(line: &str, base: usize) -> impl Iterator<Item = (Range<usize>, &str)> {
    let start = line.as_ptr() as usize;
    line.split_whitespace().map(move |tok| {
        let offset = base + (tok.as_ptr() as usize - start);
        (offset..offset + tok.len(), tok)
    })
}

fn number<T: std::str::FromStr>(tok: &str, span: &Range<usize>, what: &str) -> Result<T, ParseError> {
    tok.parse()
        .map_err(|_| error(format!("expected {}, found '{}'", what, tok), span.clone()))
}

struct Parser {
    states: Option<usize>,
    initial: usize,
    initial_span: Range<usize>,
    choices: Vec<(usize, Vec<(f64, usize)>)>,
    goals: Vec<usize>,
}

impl Parser {
    fn state(&self, tok: &str, span: &Range<usize>) -> Result<usize, ParseError> {
        let Some(n) = self.states else {
            return Err(error("`states` must be declared first", span.clone()));
        };
        let idx: usize = number(tok, span, "a state index")?;
        if idx >= n {
            return Err(error(
                format!("state {} out of range for {} states", idx, n),
                span.clone(),
            ));
        }
        Ok(idx)
    }

    fn line(&mut self, line: &str, base: usize) -> Result<(), ParseError> {
        let mut toks = tokens(line, base);
        let Some((span, head)) = toks.next() else {
            return Ok(());
        };
        let line_span = span.start..base + line.trim_end().len();
        match head {
            "states" => {
                let (span, tok) = toks
                    .next()
                    .ok_or_else(|| error("expected the number of states", line_span.clone()))?;
                if self.states.is_some() {
                    return Err(error("`states` declared twice", line_span));
                }
                let n: usize = number(tok, &span, "a number of states")?;
                if n == 0 {
                    return Err(error("a model needs at least one state", span));
                }
                self.states = Some(n);
            }
            "initial" => {
                let (span, tok) = toks
                    .next()
                    .ok_or_else(|| error("expected the initial state", line_span.clone()))?;
                self.initial = self.state(tok, &span)?;
                self.initial_span = span;
            }
            "goal" => {
                let mut any = false;
                for (span, tok) in toks.by_ref() {
                    let goal = self.state(tok, &span)?;
                    self.goals.push(goal);
                    any = true;
                }
                if !any {
                    return Err(error("expected at least one goal state", line_span));
                }
            }
            _ => {
                let from = self.state(head, &span)?;
                match toks.next() {
                    Some((_, "->")) => {}
                    _ => return Err(error("expected `->` after the source state", line_span)),
                }
                let mut branches = Vec::new();
                for (span, tok) in toks.by_ref() {
                    let Some((p, to)) = tok.split_once(':') else {
                        return Err(error(
                            format!("expected `probability:state`, found '{}'", tok),
                            span,
                        ));
                    };
                    let p: f64 = number(p, &span, "a probability")?;
                    if !(0.0..=1.0).contains(&p) {
                        return Err(error(format!("probability {} outside [0, 1]", p), span));
                    }
                    branches.push((p, self.state(to, &span)?));
                }
                if branches.is_empty() {
                    return Err(error("a choice needs at least one branch", line_span));
                }
                let sum: f64 = branches.iter().map(|(p, _)| p).sum();
                if (sum - 1.0).abs() > TOLERANCE {
                    return Err(error(
                        format!("branch probabilities sum to {}, expected 1", sum),
                        line_span,
                    ));
                }
                self.choices.push((from, branches));
            }
        }
        Ok(())
    }
}

pub fn parse(source: &str) -> Result<ModelFile, ParseError> {
    let mut parser = Parser {
        states: None,
        initial: 0,
        initial_span: 0..0,
        choices: Vec::new(),
        goals: Vec::new(),
    };
    let mut offset = 0;
    for raw in source.split_inclusive('\n') {
        let line = raw.split('#').next().unwrap_or("");
        parser.line(line, offset)?;
        offset += raw.len();
    }

    let Some(states) = parser.states else {
        return Err(error("missing `states` declaration", 0..source.len()));
    };
    if parser.goals.is_empty() {
        return Err(error(
            "missing `goal` declaration",
            source.len()..source.len(),
        ));
    }
    let mut builder = ExplicitMdp::builder(states).initial(parser.initial);
    for (from, branches) in &parser.choices {
        builder = builder.choice(*from, branches);
    }
    let mdp = builder
        .build()
        .map_err(|e| error(e.to_string(), parser.initial_span.clone()))?;
    parser.goals.sort_unstable();
    parser.goals.dedup();
    Ok(ModelFile {
        mdp,
        goals: parser.goals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROUTES: &str = "# two routes\nstates 3\n0 -> 0.9:1 0.1:2\n0 -> 0.1:1 0.9:2  # poor\ngoal 1\n";

    #[test]
    fn test_parse_model() {
        let file = parse(ROUTES).unwrap();
        assert_eq!(file.mdp.num_states(), 3);
        assert_eq!(file.goals, vec![1]);
    }

    #[test]
    fn test_out_of_range_state_points_at_token() {
        let src = "states 2\n0 -> 1.0:5\ngoal 1\n";
        let err = parse(src).unwrap_err();
        assert!(err.message.contains("out of range"), "{}", err);
        assert_eq!(&src[err.span.clone()], "1.0:5");
    }

    #[test]
    fn test_bad_probability_sum() {
        let src = "states 2\n0 -> 0.5:1 0.4:0\ngoal 1\n";
        let err = parse(src).unwrap_err();
        assert!(err.message.contains("sum to"), "{}", err);
        assert_eq!(&src[err.span.clone()], "0 -> 0.5:1 0.4:0");
    }

    #[test]
    fn test_choice_before_states() {
        let err = parse("0 -> 1.0:0\n").unwrap_err();
        assert!(err.message.contains("declared first"), "{}", err);
        assert_eq!(err.span, 0..1);
    }

    #[test]
    fn test_missing_goal() {
        let err = parse("states 1\n").unwrap_err();
        assert!(err.message.contains("goal"), "{}", err);
    }

    #[test]
    fn test_bad_number() {
        let src = "states x\n";
        let err = parse(src).unwrap_err();
        assert_eq!(&src[err.span.clone()], "x");
    }
}
