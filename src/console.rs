// Line commands for driving the grid and the player from a terminal.
//
// Grid commands (item numbers are positions on the current page, from 0):
// - n / p: Next / previous page
// - w <px>: Resize the viewport
// - t <i>: Toggle one item
// - s <i> <j>: Click i, shift-click j
// - d <i> <j>: Press on i and drag across to j
// - a / c / x: Select all / clear / invert
// - l: List the current page
// - m <i>: Show metadata of one item
// - q: Quit
//
// Player commands:
// - space or empty line: Play/pause
// - . / ,: Frame step forward / back
// - g <seconds>: Seek on the recording timeline
// - q: Stop

use std::io::{self, BufRead};
use std::thread;

use anyhow::{bail, Context, Result};
use flume::Receiver;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GridCommand {
    NextPage,
    PrevPage,
    Resize(u32),
    Toggle(usize),
    Range(usize, usize),
    Drag(usize, usize),
    SelectAll,
    Clear,
    Invert,
    List,
    Metadata(usize),
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerCommand {
    TogglePause,
    StepForward,
    StepBack,
    Seek(f64),
    Quit,
}

fn arg<T: std::str::FromStr>(words: &mut std::str::SplitWhitespace<'_>, what: &str) -> Result<T> {
    words
        .next()
        .with_context(|| format!("Missing {what}"))?
        .parse::<T>()
        .map_err(|_| anyhow::anyhow!("Invalid {what}"))
}

impl GridCommand {
    pub fn parse(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let command = match words.next().unwrap_or_default() {
            "n" => Self::NextPage,
            "p" => Self::PrevPage,
            "w" => Self::Resize(arg(&mut words, "width")?),
            "t" => Self::Toggle(arg(&mut words, "item")?),
            "s" => Self::Range(arg(&mut words, "anchor")?, arg(&mut words, "target")?),
            "d" => Self::Drag(arg(&mut words, "start")?, arg(&mut words, "end")?),
            "a" => Self::SelectAll,
            "c" => Self::Clear,
            "x" => Self::Invert,
            "l" => Self::List,
            "m" => Self::Metadata(arg(&mut words, "item")?),
            "q" => Self::Quit,
            other => bail!("Unknown grid command: {other:?}"),
        };
        Ok(command)
    }
}

impl PlayerCommand {
    pub fn parse(line: &str) -> Result<Self> {
        if line.trim().is_empty() {
            return Ok(Self::TogglePause);
        }
        let mut words = line.split_whitespace();
        let command = match words.next().unwrap_or_default() {
            "." => Self::StepForward,
            "," => Self::StepBack,
            "g" => Self::Seek(arg(&mut words, "time")?),
            "q" => Self::Quit,
            other => bail!("Unknown player command: {other:?}"),
        };
        Ok(command)
    }
}

/// Forward stdin lines to the control loop. The channel disconnects at EOF.
pub fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = flume::unbounded();
    thread::Builder::new()
        .name("console-input".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
            debug!("Console input closed");
        })
        .expect("Failed to spawn console reader");
    rx
}
