//! quick-xml event adapter for the importer.
//!
//! Drives `Importer::start`/`end` from the raw event stream and logs import
//! progress at least every ten seconds: elapsed time, fraction of the input
//! consumed, cache memory estimate and running element counts.

use std::io::BufRead;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::info;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::Importer;

const PROGRESS_EVERY: Duration = Duration::from_secs(10);

fn decode_attrs(e: &BytesStart<'_>, imp: &mut Importer<'_>) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    for a in e.attributes() {
        match a {
            Ok(a) => {
                let key = String::from_utf8_lossy(a.key.as_ref()).into_owned();
                match a.unescape_value() {
                    Ok(v) => attrs.push((key, v.into_owned())),
                    Err(_) => imp.note_discard(),
                }
            }
            Err(_) => imp.note_discard(),
        }
    }
    attrs
}

struct Progress {
    started: Instant,
    last: Instant,
    total: Option<u64>,
}

impl Progress {
    fn new(total: Option<u64>) -> Self {
        let now = Instant::now();
        Progress {
            started: now,
            last: now,
            total,
        }
    }

    fn tick(&mut self, consumed: u64, imp: &Importer<'_>, mem: usize) {
        if self.last.elapsed() < PROGRESS_EVERY {
            return;
        }
        self.last = Instant::now();
        let stats = imp.stats();
        let fraction = self
            .total
            .filter(|t| *t > 0)
            .map(|t| consumed as f64 / t as f64)
            .unwrap_or(0.0);
        info!(
            "import {:.0}s {:.1}% mem={}M nodes={} ways={} rels={} discarded={}",
            self.started.elapsed().as_secs_f64(),
            fraction * 100.0,
            mem / (1024 * 1024),
            stats.nodes,
            stats.ways,
            stats.rels,
            stats.discarded
        );
    }
}

/// Runs the whole stream through the importer and persists the changeset at
/// end of stream. `total` is the input size in bytes, when known.
pub fn run<R: BufRead>(input: R, total: Option<u64>, imp: &mut Importer<'_>) -> Result<()> {
    let mut reader = Reader::from_reader(input);
    reader.check_end_names(false);
    let mut buf = Vec::new();
    let mut progress = Progress::new(total);
    loop {
        match reader
            .read_event_into(&mut buf)
            .context("malformed OSM XML")?
        {
            Event::Start(e) => {
                let elem = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let attrs = decode_attrs(&e, imp);
                imp.start(&elem, &attrs)?;
            }
            Event::Empty(e) => {
                let elem = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let attrs = decode_attrs(&e, imp);
                imp.start(&elem, &attrs)?;
                imp.end(&elem)?;
            }
            Event::End(e) => {
                let elem = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                imp.end(&elem)?;
            }
            Event::Eof => break,
            _ => {}
        }
        progress.tick(reader.buffer_position() as u64, imp, imp.index_mem());
        buf.clear();
    }
    imp.finish()
}
