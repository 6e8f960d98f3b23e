use crate::error::DartsError;
use crate::games::darts::{MatchStarted, ThrowRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

// One line of the throw log
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entry", rename_all = "snake_case")]
pub enum LogEntry {
    MatchStarted(MatchStarted),
    Throw(ThrowRecord),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EntryKey {
    Start(Uuid),
    Throw {
        match_id: Uuid,
        turn_number: u32,
        player: String,
    },
}

impl LogEntry {
    pub fn key(&self) -> EntryKey {
        match self {
            LogEntry::MatchStarted(started) => EntryKey::Start(started.match_id),
            LogEntry::Throw(record) => EntryKey::Throw {
                match_id: record.match_id,
                turn_number: record.turn_number,
                player: record.player.clone(),
            },
        }
    }
}

// Durable home of match history. Writes are upserts: a second entry under an
// existing key replaces the first, so re-sending a record after a failed
// write never duplicates a turn.
pub trait ThrowLog {
    fn upsert(&mut self, entry: &LogEntry) -> Result<(), DartsError>;

    // One entry per key, in order of first appearance
    fn entries(&self) -> &[LogEntry];

    fn matches(&self) -> Vec<&MatchStarted> {
        self.entries()
            .iter()
            .filter_map(|entry| match entry {
                LogEntry::MatchStarted(started) => Some(started),
                LogEntry::Throw(_) => None,
            })
            .collect()
    }

    // Start entry and throws of one match, throws sorted by turn
    fn history(&self, match_id: Uuid) -> Option<(MatchStarted, Vec<ThrowRecord>)> {
        let started = self.matches().into_iter().find(|s| s.match_id == match_id)?.clone();

        let mut throws: Vec<ThrowRecord> = self
            .entries()
            .iter()
            .filter_map(|entry| match entry {
                LogEntry::Throw(record) if record.match_id == match_id => Some(record.clone()),
                _ => None,
            })
            .collect();
        throws.sort_by_key(|record| record.turn_number);

        Some((started, throws))
    }
}

#[derive(Clone, Debug, Default)]
struct Index {
    entries: Vec<LogEntry>,
    positions: HashMap<EntryKey, usize>,
}

impl Index {
    fn get(&self, key: &EntryKey) -> Option<&LogEntry> {
        self.positions.get(key).map(|&pos| &self.entries[pos])
    }

    fn insert(&mut self, entry: LogEntry) {
        let key = entry.key();
        match self.positions.get(&key) {
            Some(&pos) => self.entries[pos] = entry,
            None => {
                self.positions.insert(key, self.entries.len());
                self.entries.push(entry);
            }
        }
    }
}

// Log for scratch games that are not kept after the process exits
#[derive(Clone, Debug, Default)]
pub struct MemoryThrowLog {
    index: Index,
}

impl MemoryThrowLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ThrowLog for MemoryThrowLog {
    fn upsert(&mut self, entry: &LogEntry) -> Result<(), DartsError> {
        self.index.insert(entry.clone());
        Ok(())
    }

    fn entries(&self) -> &[LogEntry] {
        &self.index.entries
    }
}

// Append-only JSON lines file. Replacing an entry appends a new line; on load
// the last line for each key wins.
pub struct JsonlThrowLog {
    path: PathBuf,
    writer: BufWriter<File>,
    index: Index,
}

impl JsonlThrowLog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DartsError> {
        let path = path.as_ref().to_path_buf();
        let mut index = Index::default();

        // Byte length to cut the file back to when a crash left half a line
        let mut torn_at = None;
        let mut unterminated = false;

        if path.exists() {
            let file = File::open(&path)
                .map_err(|err| DartsError::persistence(format!("failed to open {}: {}", path.display(), err)))?;
            let mut reader = BufReader::new(file);
            let mut line = String::new();
            let mut line_no = 0;
            let mut offset = 0u64;

            loop {
                line.clear();
                let n_bytes = reader
                    .read_line(&mut line)
                    .map_err(|err| DartsError::persistence(format!("failed to read {}: {}", path.display(), err)))?;
                if n_bytes == 0 {
                    break;
                }
                line_no += 1;
                let complete = line.ends_with('\n');

                if !line.trim().is_empty() {
                    let entry: Result<LogEntry, jsonl::ReadError> = jsonl::read(line.as_bytes());
                    match entry {
                        Ok(entry) => {
                            index.insert(entry);
                            unterminated = !complete;
                        }
                        Err(err) if !complete => {
                            log::warn!(
                                "Dropping unfinished last line {} of {}: {}",
                                line_no,
                                path.display(),
                                read_error(err)
                            );
                            torn_at = Some(offset);
                            break;
                        }
                        Err(err) => {
                            return Err(DartsError::persistence(format!(
                                "{}:{}: unreadable log line: {}",
                                path.display(),
                                line_no,
                                read_error(err)
                            )))
                        }
                    }
                }

                offset += n_bytes as u64;
            }

            log::debug!("Loaded {} log entries from {}", index.entries.len(), path.display());
        }

        if let Some(len) = torn_at {
            OpenOptions::new()
                .write(true)
                .open(&path)
                .and_then(|file| file.set_len(len))
                .map_err(|err| DartsError::persistence(format!("failed to truncate {}: {}", path.display(), err)))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| DartsError::persistence(format!("failed to open {} for writing: {}", path.display(), err)))?;
        let mut writer = BufWriter::new(file);

        // Last entry made it but its newline did not
        if unterminated {
            writer
                .write_all(b"\n")
                .and_then(|_| writer.flush())
                .map_err(|err| DartsError::persistence(format!("failed to write {}: {}", path.display(), err)))?;
        }

        Ok(Self { path, writer, index })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

// The jsonl error alone only says "failed deserializing JSON"
fn read_error(err: jsonl::ReadError) -> String {
    match err {
        jsonl::ReadError::Deserialize(err) => err.to_string(),
        err => err.to_string(),
    }
}

impl ThrowLog for JsonlThrowLog {
    fn upsert(&mut self, entry: &LogEntry) -> Result<(), DartsError> {
        if self.index.get(&entry.key()) == Some(entry) {
            log::debug!("Entry {:?} already stored", entry.key());
            return Ok(());
        }

        jsonl::write(&mut self.writer, entry)
            .map_err(|err| DartsError::persistence(format!("failed to write {}: {}", self.path.display(), err)))?;
        self.writer
            .flush()
            .map_err(|err| DartsError::persistence(format!("failed to flush {}: {}", self.path.display(), err)))?;

        self.index.insert(entry.clone());
        Ok(())
    }

    fn entries(&self) -> &[LogEntry] {
        &self.index.entries
    }
}
