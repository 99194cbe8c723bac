//! Indoor rowing data frame decoder.
//!
//! # Frame Layout
//! ```text
//! [flags: u16] [stroke rate: u8, 0.5 spm] [stroke count: u16]
//! then, in order, each present only when its flag bit is set:
//!   avg stroke rate      u8   0.5 spm       (0x0002)
//!   total distance       u24  m             (0x0004)
//!   instantaneous pace   u16  0.5 s/500m    (0x0008)
//!   average pace         u16  0.5 s/500m    (0x0010)
//!   total energy         u16  kcal          (0x0020)
//!   energy per hour      u16  kcal/h        (0x0040)
//!   energy per minute    u8   kcal/min      (0x0080)
//!   heart rate           u8   bpm           (0x0100)
//!   metabolic equivalent u8   0.1           (0x0200)
//!   elapsed time         u16  s             (0x0400)
//!   remaining time       u16  s             (0x0800)
//! and when 0x0001 is set:
//!   instantaneous power  i16  W
//!   average power        i16  W
//!   resistance level     u16
//! ```
//!
//! All multi-byte integers are little-endian. Frames are frequently shorter than
//! the flags imply; [`decode`] keeps every field it could read in full and stops
//! at the first one it could not.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// One raw telemetry frame as delivered by the link.
pub type RawFrame = Bytes;

/// Power block (instantaneous power, average power, resistance) follows.
pub const FLAG_MORE_DATA: u16 = 0x0001;
/// Average stroke rate present.
pub const FLAG_AVERAGE_STROKE_RATE: u16 = 0x0002;
/// Total distance present.
pub const FLAG_TOTAL_DISTANCE: u16 = 0x0004;
/// Instantaneous pace present.
pub const FLAG_INSTANTANEOUS_PACE: u16 = 0x0008;
/// Average pace present.
pub const FLAG_AVERAGE_PACE: u16 = 0x0010;
/// Total energy present.
pub const FLAG_TOTAL_ENERGY: u16 = 0x0020;
/// Energy per hour present.
pub const FLAG_ENERGY_PER_HOUR: u16 = 0x0040;
/// Energy per minute present.
pub const FLAG_ENERGY_PER_MINUTE: u16 = 0x0080;
/// Heart rate present.
pub const FLAG_HEART_RATE: u16 = 0x0100;
/// Metabolic equivalent present.
pub const FLAG_MET: u16 = 0x0200;
/// Elapsed time present.
pub const FLAG_ELAPSED_TIME: u16 = 0x0400;
/// Remaining time present.
pub const FLAG_REMAINING_TIME: u16 = 0x0800;

/// Largest value a 24-bit field can carry.
pub const U24_MAX: u32 = 0x00FF_FFFF;

/// Every metric the ergometer can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    /// Strokes per minute.
    StrokeRate,
    /// Cumulative strokes since the monitor was reset.
    StrokeCount,
    /// Average strokes per minute.
    AverageStrokeRate,
    /// Cumulative distance in meters.
    TotalDistance,
    /// Current pace, seconds per 500m.
    InstantaneousPace,
    /// Average pace, seconds per 500m.
    AveragePace,
    /// Current power in watts.
    InstantaneousPower,
    /// Average power in watts.
    AveragePower,
    /// Resistance (damper) level.
    ResistanceLevel,
    /// Total energy in kcal.
    TotalEnergy,
    /// Energy rate in kcal/h.
    EnergyPerHour,
    /// Energy rate in kcal/min.
    EnergyPerMinute,
    /// Heart rate in bpm.
    HeartRate,
    /// Metabolic equivalent.
    MetabolicEquivalent,
    /// Elapsed time in seconds.
    ElapsedTime,
    /// Remaining time in seconds.
    RemainingTime,
}

impl Metric {
    /// Number of distinct metrics.
    pub const COUNT: usize = 16;

    /// All metrics, in declaration order.
    pub const ALL: [Metric; Metric::COUNT] = [
        Metric::StrokeRate,
        Metric::StrokeCount,
        Metric::AverageStrokeRate,
        Metric::TotalDistance,
        Metric::InstantaneousPace,
        Metric::AveragePace,
        Metric::InstantaneousPower,
        Metric::AveragePower,
        Metric::ResistanceLevel,
        Metric::TotalEnergy,
        Metric::EnergyPerHour,
        Metric::EnergyPerMinute,
        Metric::HeartRate,
        Metric::MetabolicEquivalent,
        Metric::ElapsedTime,
        Metric::RemainingTime,
    ];

    /// Field name used when handing values to collaborators.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Metric::StrokeRate => "strokeRate",
            Metric::StrokeCount => "strokeCount",
            Metric::AverageStrokeRate => "averageStrokeRate",
            Metric::TotalDistance => "totalDistance",
            Metric::InstantaneousPace => "instantaneousPace",
            Metric::AveragePace => "averagePace",
            Metric::InstantaneousPower => "instantaneousPower",
            Metric::AveragePower => "averagePower",
            Metric::ResistanceLevel => "resistanceLevel",
            Metric::TotalEnergy => "totalEnergy",
            Metric::EnergyPerHour => "energyPerHour",
            Metric::EnergyPerMinute => "energyPerMinute",
            Metric::HeartRate => "heartRate",
            Metric::MetabolicEquivalent => "metabolicEquivalent",
            Metric::ElapsedTime => "elapsedTime",
            Metric::RemainingTime => "remainingTime",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Sparse result of decoding one frame.
///
/// A metric is present only if its flag was set and the frame held enough bytes
/// to read it in full.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DecodedFields {
    flags: u16,
    truncated: bool,
    values: [Option<f64>; Metric::COUNT],
}

impl DecodedFields {
    /// Empty record, as produced by synthetic sources before filling it in.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Flags bitmask of the frame (0 for synthetic records).
    #[must_use]
    pub fn flags(&self) -> u16 {
        self.flags
    }

    /// Whether the flags asked for more than the frame delivered.
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Value of `metric`, if the frame carried it.
    #[must_use]
    pub fn get(&self, metric: Metric) -> Option<f64> {
        self.values[metric.index()]
    }

    /// Set `metric`; non-finite values are treated as absent.
    pub fn set(&mut self, metric: Metric, value: f64) {
        self.values[metric.index()] = value.is_finite().then_some(value);
    }

    /// Builder-style [`set`](Self::set).
    #[must_use]
    pub fn with(mut self, metric: Metric, value: f64) -> Self {
        self.set(metric, value);
        self
    }

    /// Present metrics, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (Metric, f64)> + '_ {
        Metric::ALL
            .into_iter()
            .filter_map(move |metric| self.get(metric).map(|value| (metric, value)))
    }

    /// Number of present metrics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    /// True when nothing could be decoded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Serialize for DecodedFields {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (metric, value) in self.iter() {
            map.serialize_entry(metric.name(), &value)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Copy)]
enum Encoding {
    U8,
    U16,
    U24,
    I16,
}

impl Encoding {
    fn width(self) -> usize {
        match self {
            Encoding::U8 => 1,
            Encoding::U16 | Encoding::I16 => 2,
            Encoding::U24 => 3,
        }
    }

    fn read(self, buf: &mut &[u8]) -> f64 {
        match self {
            Encoding::U8 => f64::from(buf.get_u8()),
            Encoding::U16 => f64::from(buf.get_u16_le()),
            Encoding::U24 => f64::from(read_u24_le(buf)),
            Encoding::I16 => f64::from(buf.get_i16_le()),
        }
    }

    fn write(self, buf: &mut BytesMut, raw: i64) {
        match self {
            Encoding::U8 => buf.put_u8(raw.clamp(0, i64::from(u8::MAX)) as u8),
            Encoding::U16 => buf.put_u16_le(raw.clamp(0, i64::from(u16::MAX)) as u16),
            Encoding::U24 => write_u24_le(buf, raw.clamp(0, i64::from(U24_MAX)) as u32),
            Encoding::I16 => {
                buf.put_i16_le(raw.clamp(i64::from(i16::MIN), i64::from(i16::MAX)) as i16)
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct FieldLayout {
    flag: u16,
    metric: Metric,
    encoding: Encoding,
    /// Raw units per reported unit.
    resolution: f64,
}

const fn field(flag: u16, metric: Metric, encoding: Encoding, resolution: f64) -> FieldLayout {
    FieldLayout {
        flag,
        metric,
        encoding,
        resolution,
    }
}

const MANDATORY_FIELDS: [FieldLayout; 2] = [
    field(0, Metric::StrokeRate, Encoding::U8, 2.0),
    field(0, Metric::StrokeCount, Encoding::U16, 1.0),
];

const OPTIONAL_FIELDS: [FieldLayout; 11] = [
    field(FLAG_AVERAGE_STROKE_RATE, Metric::AverageStrokeRate, Encoding::U8, 2.0),
    field(FLAG_TOTAL_DISTANCE, Metric::TotalDistance, Encoding::U24, 1.0),
    field(FLAG_INSTANTANEOUS_PACE, Metric::InstantaneousPace, Encoding::U16, 2.0),
    field(FLAG_AVERAGE_PACE, Metric::AveragePace, Encoding::U16, 2.0),
    field(FLAG_TOTAL_ENERGY, Metric::TotalEnergy, Encoding::U16, 1.0),
    field(FLAG_ENERGY_PER_HOUR, Metric::EnergyPerHour, Encoding::U16, 1.0),
    field(FLAG_ENERGY_PER_MINUTE, Metric::EnergyPerMinute, Encoding::U8, 1.0),
    field(FLAG_HEART_RATE, Metric::HeartRate, Encoding::U8, 1.0),
    field(FLAG_MET, Metric::MetabolicEquivalent, Encoding::U8, 10.0),
    field(FLAG_ELAPSED_TIME, Metric::ElapsedTime, Encoding::U16, 1.0),
    field(FLAG_REMAINING_TIME, Metric::RemainingTime, Encoding::U16, 1.0),
];

const POWER_FIELDS: [FieldLayout; 3] = [
    field(FLAG_MORE_DATA, Metric::InstantaneousPower, Encoding::I16, 1.0),
    field(FLAG_MORE_DATA, Metric::AveragePower, Encoding::I16, 1.0),
    field(FLAG_MORE_DATA, Metric::ResistanceLevel, Encoding::U16, 1.0),
];

const MANDATORY_LEN: usize = 3;

/// Read an unsigned little-endian 24-bit integer.
///
/// Caller guarantees at least three bytes remain.
pub fn read_u24_le(buf: &mut &[u8]) -> u32 {
    let lo = u32::from(buf.get_u8());
    let mid = u32::from(buf.get_u8());
    let hi = u32::from(buf.get_u8());
    lo | (mid << 8) | (hi << 16)
}

/// Write the low 24 bits of `value` little-endian.
pub fn write_u24_le(buf: &mut BytesMut, value: u32) {
    buf.put_u8((value & 0xFF) as u8);
    buf.put_u8(((value >> 8) & 0xFF) as u8);
    buf.put_u8(((value >> 16) & 0xFF) as u8);
}

/// Decode one rowing data frame.
///
/// Never fails. Returns whatever prefix of fields could be read in full; a
/// frame shorter than its flags imply is logged at debug level and otherwise
/// treated like a frame that omitted the missing fields.
#[must_use]
pub fn decode(frame: &[u8]) -> DecodedFields {
    let mut fields = DecodedFields::default();
    let mut buf = frame;

    if buf.remaining() < 2 {
        fields.truncated = !frame.is_empty();
        return fields;
    }
    fields.flags = buf.get_u16_le();

    if buf.remaining() < MANDATORY_LEN {
        fields.truncated = true;
        log_partial(&fields, frame.len());
        return fields;
    }
    for layout in &MANDATORY_FIELDS {
        read_field(&mut buf, layout, &mut fields);
    }

    let flags = fields.flags;
    let requested = OPTIONAL_FIELDS
        .iter()
        .filter(move |layout| flags & layout.flag != 0);
    let power = POWER_FIELDS
        .iter()
        .filter(move |layout| flags & layout.flag != 0);

    for layout in requested.chain(power) {
        if buf.remaining() < layout.encoding.width() {
            fields.truncated = true;
            break;
        }
        read_field(&mut buf, layout, &mut fields);
    }

    if fields.truncated {
        log_partial(&fields, frame.len());
    }
    fields
}

fn read_field(buf: &mut &[u8], layout: &FieldLayout, fields: &mut DecodedFields) {
    let raw = layout.encoding.read(buf);
    fields.set(layout.metric, raw / layout.resolution);
}

fn log_partial(fields: &DecodedFields, frame_len: usize) {
    tracing::debug!(
        flags = format_args!("{:#06x}", fields.flags),
        frame_len,
        decoded = fields.len(),
        "Rowing data frame truncated; keeping fields read so far"
    );
}

/// Lays out rowing data frames in wire format.
///
/// Used by mock transports and tests. Fields are written in layout order no
/// matter the order they were set in; values are rounded to the wire
/// resolution and clamped to the field's range.
#[derive(Debug, Clone, Default)]
pub struct FrameBuilder {
    fields: DecodedFields,
}

impl FrameBuilder {
    /// Builder with stroke rate and stroke count both zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder carrying every metric present in `fields`.
    #[must_use]
    pub fn from_fields(fields: &DecodedFields) -> Self {
        fields
            .iter()
            .fold(Self::new(), |builder, (metric, value)| builder.field(metric, value))
    }

    /// Set a metric in reported units (e.g. pace in seconds per 500m).
    #[must_use]
    pub fn field(mut self, metric: Metric, value: f64) -> Self {
        self.fields.set(metric, value);
        self
    }

    /// Flags the built frame will carry.
    #[must_use]
    pub fn flags(&self) -> u16 {
        let optional = OPTIONAL_FIELDS
            .iter()
            .filter(|layout| self.fields.get(layout.metric).is_some())
            .fold(0, |acc, layout| acc | layout.flag);
        let power = POWER_FIELDS
            .iter()
            .any(|layout| self.fields.get(layout.metric).is_some());
        if power {
            optional | FLAG_MORE_DATA
        } else {
            optional
        }
    }

    /// Encode the frame.
    #[must_use]
    pub fn build(&self) -> RawFrame {
        let flags = self.flags();
        let mut buf = BytesMut::with_capacity(32);
        buf.put_u16_le(flags);

        let optional = OPTIONAL_FIELDS
            .iter()
            .filter(|layout| flags & layout.flag != 0);
        let power = POWER_FIELDS.iter().filter(|layout| flags & layout.flag != 0);

        for layout in MANDATORY_FIELDS.iter().chain(optional).chain(power) {
            let value = self.fields.get(layout.metric).unwrap_or(0.0);
            layout
                .encoding
                .write(&mut buf, (value * layout.resolution).round() as i64);
        }
        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn frame(flags: u16, body: &[u8]) -> Vec<u8> {
        let mut bytes = flags.to_le_bytes().to_vec();
        bytes.extend_from_slice(body);
        bytes
    }

    #[test]
    fn mandatory_fields_only() {
        let data = frame(0, &[48, 10, 0]);
        let fields = decode(&data);

        assert_eq!(fields.get(Metric::StrokeRate), Some(24.0));
        assert_eq!(fields.get(Metric::StrokeCount), Some(10.0));
        assert_eq!(fields.len(), 2);
        assert!(!fields.is_truncated());
    }

    #[test]
    fn truncated_after_distance_keeps_distance() {
        let flags = FLAG_TOTAL_DISTANCE | FLAG_INSTANTANEOUS_PACE;
        // distance 1234 = 0x0004D2, pace bytes missing entirely
        let data = frame(flags, &[50, 3, 0, 0xD2, 0x04, 0x00]);
        let fields = decode(&data);

        assert_eq!(fields.get(Metric::TotalDistance), Some(1234.0));
        assert_eq!(fields.get(Metric::InstantaneousPace), None);
        assert!(fields.is_truncated());
    }

    #[test]
    fn one_byte_short_pace_is_absent() {
        let flags = FLAG_TOTAL_DISTANCE | FLAG_INSTANTANEOUS_PACE | FLAG_HEART_RATE;
        let data = frame(flags, &[50, 3, 0, 0x10, 0x00, 0x00, 0xF0]);
        let fields = decode(&data);

        assert_eq!(fields.get(Metric::TotalDistance), Some(16.0));
        assert_eq!(fields.get(Metric::InstantaneousPace), None);
        // Decoding stops at the first short field, later fields stay absent.
        assert_eq!(fields.get(Metric::HeartRate), None);
    }

    #[test]
    fn u24_reads_full_range() {
        let mut buf: &[u8] = &[0x40, 0xE2, 0x01];
        assert_eq!(read_u24_le(&mut buf), 123_456);

        let mut buf: &[u8] = &[0xFF, 0xFF, 0xFF];
        assert_eq!(read_u24_le(&mut buf), U24_MAX);
        assert_eq!(U24_MAX, 16_777_215);

        let mut buf: &[u8] = &[0x00, 0x00, 0x00];
        assert_eq!(read_u24_le(&mut buf), 0);
    }

    #[test]
    fn u24_distance_through_decoder() {
        let data = frame(FLAG_TOTAL_DISTANCE, &[0, 0, 0, 0xFF, 0xFF, 0xFF]);
        assert_eq!(decode(&data).get(Metric::TotalDistance), Some(16_777_215.0));
    }

    #[test]
    fn scaled_fields_use_wire_resolution() {
        let flags = FLAG_AVERAGE_STROKE_RATE
            | FLAG_INSTANTANEOUS_PACE
            | FLAG_AVERAGE_PACE
            | FLAG_MET
            | FLAG_ELAPSED_TIME;
        let mut body = vec![49, 0, 0, 47];
        body.extend_from_slice(&241u16.to_le_bytes());
        body.extend_from_slice(&250u16.to_le_bytes());
        body.push(87);
        body.extend_from_slice(&600u16.to_le_bytes());
        let fields = decode(&frame(flags, &body));

        assert_eq!(fields.get(Metric::StrokeRate), Some(24.5));
        assert_eq!(fields.get(Metric::AverageStrokeRate), Some(23.5));
        assert_eq!(fields.get(Metric::InstantaneousPace), Some(120.5));
        assert_eq!(fields.get(Metric::AveragePace), Some(125.0));
        assert_eq!(fields.get(Metric::MetabolicEquivalent), Some(8.7));
        assert_eq!(fields.get(Metric::ElapsedTime), Some(600.0));
    }

    #[test]
    fn power_block_is_signed() {
        let mut body = vec![40, 1, 0];
        body.extend_from_slice(&(-5i16).to_le_bytes());
        body.extend_from_slice(&210i16.to_le_bytes());
        body.extend_from_slice(&7u16.to_le_bytes());
        let fields = decode(&frame(FLAG_MORE_DATA, &body));

        assert_eq!(fields.get(Metric::InstantaneousPower), Some(-5.0));
        assert_eq!(fields.get(Metric::AveragePower), Some(210.0));
        assert_eq!(fields.get(Metric::ResistanceLevel), Some(7.0));
    }

    #[test]
    fn power_block_partially_present() {
        let mut body = vec![40, 1, 0];
        body.extend_from_slice(&180i16.to_le_bytes());
        body.push(0x01);
        let fields = decode(&frame(FLAG_MORE_DATA, &body));

        assert_eq!(fields.get(Metric::InstantaneousPower), Some(180.0));
        assert_eq!(fields.get(Metric::AveragePower), None);
        assert_eq!(fields.get(Metric::ResistanceLevel), None);
    }

    #[test]
    fn short_frames_never_panic() {
        assert!(decode(&[]).is_empty());
        assert!(decode(&[0x04]).is_empty());
        assert!(decode(&[0xFF, 0xFF]).is_empty());
        assert!(decode(&[0xFF, 0xFF, 10, 0]).is_empty());
    }

    #[test]
    fn all_flags_with_random_garbage_never_panics() {
        for len in 0..48 {
            let data: Vec<u8> = (0..len).map(|i| (i * 37 + 11) as u8).collect();
            let fields = decode(&data);
            assert!(fields.len() <= Metric::COUNT);
        }
    }

    #[test]
    #[traced_test]
    fn truncated_frame_is_logged() {
        let data = frame(FLAG_ELAPSED_TIME, &[20, 0, 0, 0x01]);
        let fields = decode(&data);
        assert!(fields.is_truncated());
        assert!(logs_contain("truncated"));
    }

    #[test]
    fn builder_lays_out_fields_in_wire_order() {
        let raw = FrameBuilder::new()
            .field(Metric::ElapsedTime, 95.0)
            .field(Metric::StrokeRate, 26.0)
            .field(Metric::TotalDistance, 410.0)
            .build();

        assert_eq!(
            raw.as_ref(),
            &[0x04, 0x04, 52, 0, 0, 0x9A, 0x01, 0x00, 95, 0][..]
        );
    }

    #[test]
    fn builder_sets_more_data_for_power() {
        let builder = FrameBuilder::new().field(Metric::AveragePower, 150.0);
        assert_eq!(builder.flags(), FLAG_MORE_DATA);

        let fields = decode(&builder.build());
        assert_eq!(fields.get(Metric::InstantaneousPower), Some(0.0));
        assert_eq!(fields.get(Metric::AveragePower), Some(150.0));
    }

    #[test]
    fn serializes_present_fields_by_name() {
        let fields = decode(&frame(0, &[48, 10, 0]));
        let json = serde_json::to_value(fields).unwrap();
        assert_eq!(json, serde_json::json!({"strokeRate": 24.0, "strokeCount": 10.0}));
    }

    #[test]
    fn non_finite_values_are_absent() {
        let fields = DecodedFields::new().with(Metric::InstantaneousPace, f64::NAN);
        assert_eq!(fields.get(Metric::InstantaneousPace), None);
    }
}
