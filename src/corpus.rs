//! Walk corpus sinks and reader.
//!
//! A corpus is plain text: one walk per line, labels separated by single
//! spaces, in emission order.

use std::io::{self, BufRead, Write};

/// Destination for generated walks.
pub trait WalkSink {
    fn write_walk(&mut self, labels: &[&str]) -> io::Result<()>;

    /// Called once per completed walk, degenerate or not.
    fn record_max_distance(&mut self, _distance: usize) -> io::Result<()> {
        Ok(())
    }
}

impl<S: WalkSink + ?Sized> WalkSink for &mut S {
    fn write_walk(&mut self, labels: &[&str]) -> io::Result<()> {
        (**self).write_walk(labels)
    }

    fn record_max_distance(&mut self, distance: usize) -> io::Result<()> {
        (**self).record_max_distance(distance)
    }
}

/// Writes walks as text lines, optionally keeping the per-walk maximum
/// stack distances for the diagnostics side channel.
#[derive(Debug)]
pub struct LineSink<W: Write> {
    out: W,
    distances: Option<Vec<usize>>,
}

impl<W: Write> LineSink<W> {
    pub fn new(out: W) -> Self {
        Self { out, distances: None }
    }

    pub fn with_distances(out: W) -> Self {
        Self {
            out,
            distances: Some(Vec::new()),
        }
    }

    pub fn distances(&self) -> &[usize] {
        self.distances.as_deref().unwrap_or(&[])
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> WalkSink for LineSink<W> {
    fn write_walk(&mut self, labels: &[&str]) -> io::Result<()> {
        for (i, label) in labels.iter().enumerate() {
            if i > 0 {
                self.out.write_all(b" ")?;
            }
            self.out.write_all(label.as_bytes())?;
        }
        self.out.write_all(b"\n")
    }

    fn record_max_distance(&mut self, distance: usize) -> io::Result<()> {
        if let Some(d) = self.distances.as_mut() {
            d.push(distance);
        }
        Ok(())
    }
}

/// Keeps walks in memory instead of streaming them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectSink {
    pub walks: Vec<Vec<String>>,
    pub distances: Vec<usize>,
}

impl WalkSink for CollectSink {
    fn write_walk(&mut self, labels: &[&str]) -> io::Result<()> {
        self.walks
            .push(labels.iter().map(|l| (*l).to_owned()).collect());
        Ok(())
    }

    fn record_max_distance(&mut self, distance: usize) -> io::Result<()> {
        self.distances.push(distance);
        Ok(())
    }
}

/// Writes stack distances as a single comma-separated row.
pub fn write_distance_row<W: Write>(mut out: W, distances: &[usize]) -> io::Result<()> {
    for (i, d) in distances.iter().enumerate() {
        if i > 0 {
            out.write_all(b",")?;
        }
        write!(out, "{d}")?;
    }
    out.write_all(b"\n")?;
    out.flush()
}

/// Splits a corpus back into label sequences, dropping labels that start
/// with any of `remove_prefixes`.
pub fn read_walks<R: BufRead>(reader: R, remove_prefixes: &[String]) -> io::Result<Vec<Vec<String>>> {
    let mut walks = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let walk = line
            .split_whitespace()
            .filter(|label| !remove_prefixes.iter().any(|p| label.starts_with(p.as_str())))
            .map(str::to_owned)
            .collect();
        walks.push(walk);
    }
    Ok(walks)
}
