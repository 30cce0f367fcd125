//! codec.rs — little-endian payload schemas
//!
//! Every payload is field-by-field LE with `u32` prefixes on repeated fields
//! and strings. The framing layer's `message_size` is authoritative: a body
//! that leaves trailing bytes, or runs short, fails to parse. The
//! length-prefixed record forms of [`LandingCase`] and [`Genome`] are shared
//! with the trainer's checkpoint file.

use bytes::{Buf, BufMut, BytesMut};
use lander_core::genome::{Genome, LandingCase};
use lander_core::geometry::{FPoint, IPoint, Span};
use lander_core::nn::GENOME_LEN;

use crate::packet::TransferError;
use crate::{Cases, Message, OutcomeRating, Outcomes, Population};
use crate::{MSG_CASES, MSG_OUTCOMES, MSG_POPULATION};

// ── Read guards ───────────────────────────────────────────────────────────────

fn need(buf: &[u8], n: usize, what: &'static str) -> Result<(), TransferError> {
    if buf.len() < n {
        Err(TransferError::Malformed(what))
    } else {
        Ok(())
    }
}

fn get_count(buf: &mut &[u8], what: &'static str) -> Result<usize, TransferError> {
    need(buf, 4, what)?;
    Ok(buf.get_u32_le() as usize)
}

// ── Record forms (wire + checkpoint) ──────────────────────────────────────────

pub fn encode_landing_case(case: &LandingCase, buf: &mut BytesMut) {
    buf.put_u64_le(case.id);
    buf.put_i32_le(case.fuel);
    buf.put_i32_le(case.thrust);
    buf.put_i32_le(case.tilt);
    buf.put_u32_le(case.safe_area.start);
    buf.put_u32_le(case.safe_area.end);
    buf.put_i32_le(case.position.x);
    buf.put_i32_le(case.position.y);
    buf.put_f64_le(case.velocity.x);
    buf.put_f64_le(case.velocity.y);
    buf.put_u32_le(case.surface.len() as u32);
    for p in &case.surface {
        buf.put_i32_le(p.x);
        buf.put_i32_le(p.y);
    }
}

pub fn decode_landing_case(buf: &mut &[u8]) -> Result<LandingCase, TransferError> {
    need(buf, 8 + 3 * 4 + 2 * 4 + 2 * 4 + 2 * 8, "landing_case")?;
    let id = buf.get_u64_le();
    let fuel = buf.get_i32_le();
    let thrust = buf.get_i32_le();
    let tilt = buf.get_i32_le();
    let safe_area = Span { start: buf.get_u32_le(), end: buf.get_u32_le() };
    let position = IPoint::new(buf.get_i32_le(), buf.get_i32_le());
    let velocity = FPoint::new(buf.get_f64_le(), buf.get_f64_le());

    let count = get_count(buf, "landing_case surface")?;
    need(buf, count * 8, "landing_case surface")?;
    let mut surface = Vec::with_capacity(count);
    for _ in 0..count {
        surface.push(IPoint::new(buf.get_i32_le(), buf.get_i32_le()));
    }

    Ok(LandingCase { id, fuel, thrust, tilt, safe_area, position, velocity, surface })
}

pub fn encode_genome(genome: &Genome, buf: &mut BytesMut) {
    buf.put_u64_le(genome.id);
    buf.put_u32_le(genome.genes.len() as u32);
    for &g in &genome.genes {
        buf.put_f64_le(g);
    }
}

pub fn decode_genome(buf: &mut &[u8]) -> Result<Genome, TransferError> {
    need(buf, 8, "genome")?;
    let id = buf.get_u64_le();
    let count = get_count(buf, "genome genes")?;
    if count != GENOME_LEN {
        return Err(TransferError::Malformed("genome gene count"));
    }
    need(buf, count * 8, "genome genes")?;
    let genes = (0..count).map(|_| buf.get_f64_le()).collect();
    Ok(Genome { id, genes })
}

// ── Message payloads ──────────────────────────────────────────────────────────

fn encode_cases(msg: &Cases, buf: &mut BytesMut) {
    buf.put_u32_le(msg.data.len() as u32);
    for case in &msg.data {
        encode_landing_case(case, buf);
    }
}

fn decode_cases(buf: &mut &[u8]) -> Result<Cases, TransferError> {
    let count = get_count(buf, "cases")?;
    let mut data = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        data.push(decode_landing_case(buf)?);
    }
    Ok(Cases { data })
}

fn encode_outcomes(msg: &Outcomes, buf: &mut BytesMut) {
    buf.put_u32_le(msg.client_name.len() as u32);
    buf.put_slice(msg.client_name.as_bytes());
    buf.put_u64_le(msg.generation);
    buf.put_u32_le(msg.capacity);
    buf.put_u32_le(msg.data.len() as u32);
    for o in &msg.data {
        buf.put_u64_le(o.case_id);
        buf.put_u64_le(o.genome_id);
        buf.put_f64_le(o.rating);
    }
}

fn decode_outcomes(buf: &mut &[u8]) -> Result<Outcomes, TransferError> {
    let name_len = get_count(buf, "outcomes client_name")?;
    need(buf, name_len, "outcomes client_name")?;
    let client_name = String::from_utf8(buf[..name_len].to_vec())
        .map_err(|_| TransferError::Malformed("outcomes client_name"))?;
    buf.advance(name_len);

    need(buf, 8 + 4, "outcomes")?;
    let generation = buf.get_u64_le();
    let capacity = buf.get_u32_le();

    let count = get_count(buf, "outcomes data")?;
    need(buf, count * 24, "outcomes data")?;
    let mut data = Vec::with_capacity(count);
    for _ in 0..count {
        data.push(OutcomeRating {
            case_id: buf.get_u64_le(),
            genome_id: buf.get_u64_le(),
            rating: buf.get_f64_le(),
        });
    }
    Ok(Outcomes { client_name, generation, capacity, data })
}

fn encode_population(msg: &Population, buf: &mut BytesMut) {
    buf.put_u64_le(msg.generation);
    buf.put_u32_le(msg.data.len() as u32);
    for genome in &msg.data {
        encode_genome(genome, buf);
    }
}

fn decode_population(buf: &mut &[u8]) -> Result<Population, TransferError> {
    need(buf, 8, "population")?;
    let generation = buf.get_u64_le();
    let count = get_count(buf, "population data")?;
    let mut data = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        data.push(decode_genome(buf)?);
    }
    Ok(Population { generation, data })
}

// ── Dispatch ──────────────────────────────────────────────────────────────────

pub fn encode_message(msg: &Message) -> BytesMut {
    let mut buf = BytesMut::new();
    match msg {
        Message::Cases(m) => encode_cases(m, &mut buf),
        Message::Outcomes(m) => encode_outcomes(m, &mut buf),
        Message::Population(m) => encode_population(m, &mut buf),
    }
    buf
}

/// Decode one body by its framing id. The whole body must be consumed.
pub fn decode_message(id: u32, body: &[u8]) -> Result<Message, TransferError> {
    let mut buf = body;
    let msg = match id {
        MSG_CASES => Message::Cases(decode_cases(&mut buf)?),
        MSG_OUTCOMES => Message::Outcomes(decode_outcomes(&mut buf)?),
        MSG_POPULATION => Message::Population(decode_population(&mut buf)?),
        other => return Err(TransferError::UnknownMessageId(other)),
    };
    if !buf.is_empty() {
        return Err(TransferError::Malformed("trailing payload bytes"));
    }
    Ok(msg)
}
