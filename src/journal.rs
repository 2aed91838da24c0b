use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Encode one commit (a batch of events) as a single frame:
/// `[u32: len][bincode: Vec<Event>][u32: crc32]`.
fn encode_commit(writer: &mut impl Write, events: &[Event]) -> io::Result<()> {
    let payload =
        bincode::serialize(events).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = payload.len() as u32;
    let crc = crc32fast::hash(&payload);
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(())
}

/// Append-only commit journal.
///
/// Each frame holds a whole commit, so a multi-step mutation (e.g. a booking
/// approval: status flip + slots + anchor payment + cancellations + invoice)
/// is durable all-or-nothing: a truncated or corrupt trailing frame is
/// discarded whole on replay, never half-applied.
pub struct Journal {
    writer: BufWriter<File>,
    path: PathBuf,
    commits_since_compact: u64,
}

impl Journal {
    /// Open (or create) the journal file at `path`.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            commits_since_compact: 0,
        })
    }

    /// Append one commit and fsync. Used by tests only — production code
    /// uses `append_buffered` + `flush_sync` for group commit.
    #[cfg(test)]
    pub fn append(&mut self, events: &[Event]) -> io::Result<()> {
        self.append_buffered(events)?;
        self.flush_sync()
    }

    /// Buffer one commit frame without flushing or syncing. Call
    /// `flush_sync()` after the batch to durably commit everything buffered.
    pub fn append_buffered(&mut self, events: &[Event]) -> io::Result<()> {
        encode_commit(&mut self.writer, events)?;
        self.commits_since_compact += 1;
        Ok(())
    }

    /// Flush the BufWriter and fsync the underlying file.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a compacted snapshot (one commit per venue) to a temp file and
    /// fsync. This is the slow I/O phase — runs outside the writer's turn.
    pub fn write_compact_file(path: &Path, commits: &[Vec<Event>]) -> io::Result<()> {
        let tmp_path = path.with_extension("journal.tmp");
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        for commit in commits {
            encode_commit(&mut writer, commit)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Atomic swap: rename the temp file over the journal and reopen.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        let tmp_path = self.path.with_extension("journal.tmp");
        fs::rename(&tmp_path, &self.path)?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.commits_since_compact = 0;
        Ok(())
    }

    /// Replace the journal with a snapshot. Both phases; used by tests.
    #[cfg(test)]
    pub fn compact(&mut self, commits: &[Vec<Event>]) -> io::Result<()> {
        Self::write_compact_file(&self.path, commits)?;
        self.swap_compact_file()
    }

    pub fn commits_since_compact(&self) -> u64 {
        self.commits_since_compact
    }

    /// Replay the journal from disk, returning events of all valid commits
    /// in order. Truncated or corrupt trailing frames are discarded whole.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut events = Vec::new();

        loop {
            let mut len_buf = [0u8; 4];
            match reader.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            }
            let len = u32::from_le_bytes(len_buf) as usize;

            let mut payload = vec![0u8; len];
            match reader.read_exact(&mut payload) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break, // truncated
                Err(e) => return Err(e),
            }

            let mut crc_buf = [0u8; 4];
            match reader.read_exact(&mut crc_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break, // truncated
                Err(e) => return Err(e),
            }
            let stored_crc = u32::from_le_bytes(crc_buf);
            if stored_crc != crc32fast::hash(&payload) {
                // Corrupt frame — stop replaying
                break;
            }

            match bincode::deserialize::<Vec<Event>>(&payload) {
                Ok(commit) => events.extend(commit),
                Err(_) => break, // corrupt payload
            }
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VenueMode;
    use ulid::Ulid;

    fn tmp_path(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join("venued_test_journal");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    fn venue_created(id: Ulid) -> Event {
        Event::VenueCreated {
            id,
            name: Some("Hall".into()),
            mode: VenueMode::Daily,
            capacity: 100,
            base_amount: 10_000,
            buffer_min: None,
        }
    }

    #[test]
    fn append_and_replay() {
        let path = tmp_path("append_and_replay.journal");
        let vid = Ulid::new();
        let commits = vec![
            vec![venue_created(vid)],
            vec![
                Event::BookingApproved { id: Ulid::new(), venue_id: vid },
                Event::PaymentsSettled { booking_id: Ulid::new(), venue_id: vid },
            ],
        ];

        {
            let mut journal = Journal::open(&path).unwrap();
            for c in &commits {
                journal.append(c).unwrap();
            }
        }

        let replayed = Journal::replay(&path).unwrap();
        let flat: Vec<Event> = commits.into_iter().flatten().collect();
        assert_eq!(replayed, flat);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn replay_discards_truncated_commit_whole() {
        let path = tmp_path("truncation.journal");
        let first = vec![venue_created(Ulid::new())];

        {
            let mut journal = Journal::open(&path).unwrap();
            journal.append(&first).unwrap();
        }

        // Simulate a crash mid-write of the next commit
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[0u8; 6]).unwrap(); // partial length + some bytes
        }

        let replayed = Journal::replay(&path).unwrap();
        assert_eq!(replayed, first);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn replay_nonexistent_file() {
        let path = tmp_path("nonexistent.journal");
        assert!(Journal::replay(&path).unwrap().is_empty());
    }

    #[test]
    fn replay_corrupt_crc() {
        let path = tmp_path("corrupt_crc.journal");
        let commit = vec![venue_created(Ulid::new())];

        {
            let payload = bincode::serialize(&commit).unwrap();
            let len = payload.len() as u32;
            let bad_crc: u32 = 0xDEADBEEF;

            let mut f = File::create(&path).unwrap();
            f.write_all(&len.to_le_bytes()).unwrap();
            f.write_all(&payload).unwrap();
            f.write_all(&bad_crc.to_le_bytes()).unwrap();
        }

        assert!(Journal::replay(&path).unwrap().is_empty());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn compact_reduces_journal() {
        let path = tmp_path("compact_reduce.journal");
        let vid = Ulid::new();
        let bid = Ulid::new();

        {
            let mut journal = Journal::open(&path).unwrap();
            journal.append(&[venue_created(vid)]).unwrap();
            // Churn: approve + cancel the same booking repeatedly
            for _ in 0..10 {
                journal
                    .append(&[Event::BookingApproved { id: bid, venue_id: vid }])
                    .unwrap();
                journal
                    .append(&[Event::BookingCancelled {
                        id: bid,
                        venue_id: vid,
                        reason: "churn".into(),
                    }])
                    .unwrap();
            }
        }

        let before = fs::metadata(&path).unwrap().len();
        assert!(before > 0);

        let snapshot = vec![vec![venue_created(vid)]];
        {
            let mut journal = Journal::open(&path).unwrap();
            journal.compact(&snapshot).unwrap();
        }

        let after = fs::metadata(&path).unwrap().len();
        assert!(after < before, "compacted journal should be smaller: {after} < {before}");
        assert_eq!(Journal::replay(&path).unwrap(), snapshot[0]);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn compact_then_append() {
        let path = tmp_path("compact_append.journal");
        let vid = Ulid::new();
        let snapshot = vec![vec![venue_created(vid)]];
        let next = Event::BookingApproved { id: Ulid::new(), venue_id: vid };

        {
            let mut journal = Journal::open(&path).unwrap();
            journal.append(&snapshot[0]).unwrap();
            journal.compact(&snapshot).unwrap();
            journal.append(std::slice::from_ref(&next)).unwrap();
        }

        let replayed = Journal::replay(&path).unwrap();
        assert_eq!(replayed.len(), 2);
        assert_eq!(replayed[0], snapshot[0][0]);
        assert_eq!(replayed[1], next);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn buffered_commits_then_flush() {
        let path = tmp_path("buffered_flush.journal");
        let commits: Vec<Vec<Event>> =
            (0..5).map(|_| vec![venue_created(Ulid::new())]).collect();

        {
            let mut journal = Journal::open(&path).unwrap();
            for c in &commits {
                journal.append_buffered(c).unwrap();
            }
            assert_eq!(journal.commits_since_compact(), 5);
            journal.flush_sync().unwrap();
        }

        let flat: Vec<Event> = commits.into_iter().flatten().collect();
        assert_eq!(Journal::replay(&path).unwrap(), flat);

        let _ = fs::remove_file(&path);
    }
}
