//! Runtime Trace Log
//!
//! Parses `TRACE|...` lines emitted by an instrumented firmware build into
//! one [`TraceStep`] per function entry, carrying the values recorded while
//! that function was on top of the call stack.
//!
//! ```text
//! TRACE|ENTER|f=indcpa_keypair|d=1
//! TRACE|U32|f=indcpa_keypair|n=nonce|v=3
//! TRACE|BUF|f=indcpa_keypair|n=seed|len=4|off=2|hex=cdef
//! TRACE|BUF|f=indcpa_keypair|n=seed|len=4|off=0|hex=89ab
//! TRACE|EXIT|f=indcpa_keypair
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

static TRACE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^TRACE\|(ENTER|EXIT|BUF|U32)\|(.+)$").expect("valid trace pattern")
});

/// A value captured during one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TraceVar {
    U32 { name: String, value: String },
    /// A buffer reassembled from its chunks in offset order.
    Buf { name: String, len: u64, hex: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceStep {
    pub id: usize,
    pub func: String,
    pub depth: usize,
    pub vars: Vec<TraceVar>,
}

struct PendingBuffer {
    step: usize,
    name: String,
    len: u64,
    chunks: BTreeMap<u64, String>,
}

/// `k=v` pairs of one record; parts without `=` are ignored.
fn parse_fields(rest: &str) -> HashMap<&str, &str> {
    rest.split('|').filter_map(|part| part.split_once('=')).collect()
}

fn number<T: std::str::FromStr + Default>(fields: &HashMap<&str, &str>, key: &str) -> T {
    fields
        .get(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or_default()
}

fn text(fields: &HashMap<&str, &str>, key: &str, default: &str) -> String {
    fields.get(key).copied().unwrap_or(default).to_string()
}

/// Build the step list from a trace log.
///
/// Lines that are not trace records are skipped, as are `BUF` and `U32`
/// records arriving while no function is active. Buffers are appended to
/// their step after all `U32` values, in first-seen order.
pub fn parse_trace_log(log: &str) -> Vec<TraceStep> {
    let mut steps: Vec<TraceStep> = Vec::new();
    let mut stack: Vec<usize> = Vec::new();
    let mut buffers: Vec<PendingBuffer> = Vec::new();
    let mut buffer_index: HashMap<(usize, String, String), usize> = HashMap::new();

    for line in log.lines() {
        let Some(caps) = TRACE_LINE.captures(line.trim()) else {
            continue;
        };
        let kind = caps.get(1).map_or("", |m| m.as_str());
        let fields = parse_fields(caps.get(2).map_or("", |m| m.as_str()));

        match kind {
            "ENTER" => {
                let id = steps.len();
                steps.push(TraceStep {
                    id,
                    func: text(&fields, "f", "?"),
                    depth: number(&fields, "d"),
                    vars: Vec::new(),
                });
                stack.push(id);
            }
            "EXIT" => {
                stack.pop();
            }
            "BUF" => {
                let Some(&step) = stack.last() else {
                    continue;
                };
                let name = text(&fields, "n", "?");
                let key = (step, text(&fields, "f", "?"), name.clone());
                let slot = *buffer_index.entry(key).or_insert_with(|| {
                    buffers.push(PendingBuffer {
                        step,
                        name,
                        len: number(&fields, "len"),
                        chunks: BTreeMap::new(),
                    });
                    buffers.len() - 1
                });
                buffers[slot]
                    .chunks
                    .insert(number(&fields, "off"), text(&fields, "hex", ""));
            }
            "U32" => {
                let Some(&step) = stack.last() else {
                    continue;
                };
                steps[step].vars.push(TraceVar::U32 {
                    name: text(&fields, "n", "?"),
                    value: text(&fields, "v", "0"),
                });
            }
            _ => {}
        }
    }

    for buffer in buffers {
        steps[buffer.step].vars.push(TraceVar::Buf {
            name: buffer.name,
            len: buffer.len,
            hex: buffer.chunks.into_values().collect(),
        });
    }
    steps
}
