//! persistence.rs — checksummed, resumable session checkpoint
//!
//! `training.dat` layout (little-endian):
//!
//! ```text
//! u32 crc32c_of_rest
//! u64 check, generation, cases_count, population_size,
//!     elite_count, tournament_size
//! algorithm_args crossover      // u64 name_len; bytes; u64 n; f64[n]
//! algorithm_args mutation
//! u64 last_genome_id
//! per case:   u64 size; bytes[size]   // lander-proto record form
//! per genome: u64 size; bytes[size]
//! ```
//!
//! Writing truncates, writes a zero placeholder checksum, the body, then
//! overwrites the placeholder with CRC-32C over the body. A mismatch on load
//! marks the file corrupted; a corrupted file is never overwritten
//! automatically.

use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut, BytesMut};
use crc::{Crc, CRC_32_ISCSI};
use tracing::{debug, error};

use lander_core::genome::{Genome, LandingCase};
use lander_proto::codec;

use crate::state::{AlgorithmArgs, AppState};

pub const TRAINING_FILENAME: &str = "training.dat";

pub const CRC32C: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("checkpoint i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("checkpoint is corrupted (checksum mismatch)")]
    Corrupted,
    #[error("malformed checkpoint: {0}")]
    Malformed(&'static str),
}

/// Everything a checkpoint stores; operators and indices are rebuilt by the
/// caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub check: u64,
    pub generation: u64,
    pub cases_count: u64,
    pub population_size: u64,
    pub elite_count: u64,
    pub tournament_size: u64,
    pub crossover: AlgorithmArgs,
    pub mutation: AlgorithmArgs,
    pub last_genome_id: u64,
    pub cases: Vec<LandingCase>,
    pub population: Vec<Genome>,
}

// ── Body encoding ─────────────────────────────────────────────────────────────

fn put_algorithm(args: &AlgorithmArgs, buf: &mut BytesMut) {
    buf.put_u64_le(args.name.len() as u64);
    buf.put_slice(args.name.as_bytes());
    buf.put_u64_le(args.values.len() as u64);
    for &v in &args.values {
        buf.put_f64_le(v);
    }
}

pub fn encode_body(state: &AppState) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_u64_le(state.check);
    buf.put_u64_le(state.generation);
    buf.put_u64_le(state.cases.len() as u64);
    buf.put_u64_le(state.population.len() as u64);
    buf.put_u64_le(state.elite_count as u64);
    buf.put_u64_le(state.tournament_size as u64);
    put_algorithm(&state.crossover, &mut buf);
    put_algorithm(&state.mutation, &mut buf);
    buf.put_u64_le(state.uids.value());

    let mut record = BytesMut::new();
    for case in &state.cases {
        record.clear();
        codec::encode_landing_case(case, &mut record);
        buf.put_u64_le(record.len() as u64);
        buf.put_slice(&record);
    }
    for genome in &state.population {
        record.clear();
        codec::encode_genome(genome, &mut record);
        buf.put_u64_le(record.len() as u64);
        buf.put_slice(&record);
    }
    buf.to_vec()
}

// ── Body decoding ─────────────────────────────────────────────────────────────

fn need(buf: &[u8], n: usize, what: &'static str) -> Result<(), StateError> {
    if buf.len() < n {
        Err(StateError::Malformed(what))
    } else {
        Ok(())
    }
}

fn get_u64(buf: &mut &[u8], what: &'static str) -> Result<u64, StateError> {
    need(buf, 8, what)?;
    Ok(buf.get_u64_le())
}

fn get_algorithm(buf: &mut &[u8]) -> Result<AlgorithmArgs, StateError> {
    let name_len = get_u64(buf, "algorithm name")? as usize;
    need(buf, name_len, "algorithm name")?;
    let name = String::from_utf8(buf[..name_len].to_vec())
        .map_err(|_| StateError::Malformed("algorithm name"))?;
    buf.advance(name_len);

    let count = get_u64(buf, "algorithm values")? as usize;
    need(buf, count * 8, "algorithm values")?;
    let values = (0..count).map(|_| buf.get_f64_le()).collect();
    Ok(AlgorithmArgs { name, values })
}

fn get_record<'a>(buf: &mut &'a [u8], what: &'static str) -> Result<&'a [u8], StateError> {
    let size = get_u64(buf, what)? as usize;
    need(buf, size, what)?;
    let record = &buf[..size];
    buf.advance(size);
    Ok(record)
}

pub fn decode_body(mut buf: &[u8]) -> Result<Checkpoint, StateError> {
    let buf = &mut buf;
    let check = get_u64(buf, "check")?;
    let generation = get_u64(buf, "generation")?;
    let cases_count = get_u64(buf, "cases count")?;
    let population_size = get_u64(buf, "population size")?;
    let elite_count = get_u64(buf, "elite count")?;
    let tournament_size = get_u64(buf, "tournament size")?;
    let crossover = get_algorithm(buf)?;
    let mutation = get_algorithm(buf)?;
    let last_genome_id = get_u64(buf, "last genome id")?;

    let mut cases = Vec::with_capacity((cases_count as usize).min(4096));
    for _ in 0..cases_count {
        let mut record = get_record(buf, "case record")?;
        let case = codec::decode_landing_case(&mut record)
            .map_err(|_| StateError::Malformed("case record"))?;
        if !record.is_empty() {
            return Err(StateError::Malformed("case record"));
        }
        cases.push(case);
    }

    let mut population = Vec::with_capacity((population_size as usize).min(4096));
    for _ in 0..population_size {
        let mut record = get_record(buf, "genome record")?;
        let genome = codec::decode_genome(&mut record)
            .map_err(|_| StateError::Malformed("genome record"))?;
        if !record.is_empty() {
            return Err(StateError::Malformed("genome record"));
        }
        population.push(genome);
    }

    if !buf.is_empty() {
        return Err(StateError::Malformed("trailing bytes"));
    }

    Ok(Checkpoint {
        check,
        generation,
        cases_count,
        population_size,
        elite_count,
        tournament_size,
        crossover,
        mutation,
        last_genome_id,
        cases,
        population,
    })
}

// ── File i/o ──────────────────────────────────────────────────────────────────

/// Truncate, zero placeholder, body, then the real checksum over the body.
pub fn write_checkpoint(path: &Path, body: &[u8]) -> std::io::Result<()> {
    let mut f = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    f.write_all(&0u32.to_le_bytes())?;
    f.write_all(body)?;
    let checksum = CRC32C.checksum(body);
    f.seek(SeekFrom::Start(0))?;
    f.write_all(&checksum.to_le_bytes())?;
    f.sync_all()
}

/// Verify the checksum and parse. A mismatch is [`StateError::Corrupted`].
pub fn load_checkpoint(path: &Path) -> Result<Checkpoint, StateError> {
    let mut raw = Vec::new();
    std::fs::File::open(path)?.read_to_end(&mut raw)?;
    need(&raw, 4, "checksum")?;
    let expected = u32::from_le_bytes(raw[..4].try_into().expect("4 bytes"));
    let body = &raw[4..];
    let actual = CRC32C.checksum(body);
    if actual != expected {
        debug!("checksum mismatch! found {expected}, but {actual} was computed.");
        return Err(StateError::Corrupted);
    }
    decode_body(body)
}

/// Snapshot on the caller's thread, write on a blocking task. Failures are
/// logged; the training run continues either way.
pub fn persist_in_background(state: &AppState) {
    let body = encode_body(state);
    let path: PathBuf = state.directory.join(TRAINING_FILENAME);
    tokio::task::spawn_blocking(move || match write_checkpoint(&path, &body) {
        Ok(()) => debug!("persisted training state ({} bytes).", body.len() + 4),
        Err(e) => error!("failed to persist training state: {e}"),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::app_state;

    #[test]
    fn crc32c_known_vector() {
        assert_eq!(CRC32C.checksum(b"123456789"), 0xE306_9283);
    }

    #[test]
    fn crc32c_chunked_updates_match_one_shot() {
        let data = b"the quick brown fox jumps over the lazy dog";
        for split in 0..data.len() {
            let mut digest = CRC32C.digest();
            digest.update(&data[..split]);
            digest.update(&data[split..]);
            assert_eq!(digest.finalize(), CRC32C.checksum(data));
        }
    }

    #[test]
    fn checkpoint_round_trip() {
        let state = app_state(3, 4);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(TRAINING_FILENAME);

        write_checkpoint(&path, &encode_body(&state)).unwrap();
        let loaded = load_checkpoint(&path).unwrap();

        assert_eq!(loaded.check, state.check);
        assert_eq!(loaded.generation, state.generation);
        assert_eq!(loaded.cases_count, 3);
        assert_eq!(loaded.population_size, 4);
        assert_eq!(loaded.crossover, state.crossover);
        assert_eq!(loaded.mutation, state.mutation);
        assert_eq!(loaded.last_genome_id, state.uids.value());
        assert_eq!(loaded.cases, state.cases);
        assert_eq!(loaded.population, state.population);
    }

    #[test]
    fn any_flipped_body_byte_fails_integrity() {
        let state = app_state(1, 2);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(TRAINING_FILENAME);
        write_checkpoint(&path, &encode_body(&state)).unwrap();

        let good = std::fs::read(&path).unwrap();
        // Flip one byte in a few spots across the body (offset 4 onward).
        for &offset in &[4usize, good.len() / 2, good.len() - 1] {
            let mut bad = good.clone();
            bad[offset] ^= 0x01;
            std::fs::write(&path, &bad).unwrap();
            assert!(matches!(load_checkpoint(&path), Err(StateError::Corrupted)));
        }
    }

    #[test]
    fn truncated_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(TRAINING_FILENAME);
        std::fs::write(&path, [1, 2]).unwrap();
        assert!(matches!(
            load_checkpoint(&path),
            Err(StateError::Malformed("checksum"))
        ));
    }
}
