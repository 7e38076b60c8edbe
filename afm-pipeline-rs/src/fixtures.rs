//! Synthetic JPK force-map archives for tests.
//!
//! Each curve indents an elastic paraboloid contact: the extend segment
//! follows Hertz, the retract segment returns along a softer branch so the
//! curve encloses a hysteresis area.

#![allow(dead_code)]

use std::fmt::Write as _;
use std::io::{Cursor, Write};
use std::path::Path;

use zip::write::FileOptions;
use zip::ZipWriter;

pub const POINTS_PER_SEGMENT: usize = 400;
pub const SEGMENT_DURATION_S: f64 = 0.5;
pub const SPRING_CONSTANT: f64 = 0.1;
pub const DEF_SENS_M_PER_V: f64 = 5e-8;
pub const BASELINE_OFFSET_V: f64 = 0.05;
pub const TIP_RADIUS: f64 = 5e-6;
pub const YOUNG_MODULUS: f64 = 2000.0;
/// Piezo travel after the height shift.
pub const Z_MAX: f64 = 3e-6;
/// Piezo height where the tip touches the sample.
pub const Z_CONTACT: f64 = 1.8e-6;
/// Raw height at the start of the approach.
pub const H0: f64 = 4e-6;
/// Fraction of the extend force kept on the way back.
pub const RETRACT_RATIO: f64 = 0.8;

const HEIGHT_ENCODER_MULTIPLIER: f64 = 1e-5;
const HEIGHT_NOMINAL_MULTIPLIER: f64 = 1e-5;
const NOISE_V: f64 = 2e-4;

/// Paraboloid Hertz prefactor for an incompressible sample.
fn hertz_prefactor() -> f64 {
    4.0 / 3.0 * TIP_RADIUS.sqrt() / (1.0 - 0.5 * 0.5) * YOUNG_MODULUS
}

/// Cantilever deflection balancing the sample force at piezo height `z`.
pub fn elastic_deflection(z: f64) -> f64 {
    let u = z - Z_CONTACT;
    if u <= 0.0 {
        return 0.0;
    }
    let a = hertz_prefactor();
    let (mut lo, mut hi) = (0.0, u);
    for _ in 0..80 {
        let mid = 0.5 * (lo + hi);
        let residual = SPRING_CONSTANT * mid - a * (u - mid).powf(1.5);
        if residual > 0.0 {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    0.5 * (lo + hi)
}

fn noise(i: usize) -> f64 {
    let x = ((i as f64 * 12.9898).sin() * 43758.5453).fract();
    (x - 0.5) * NOISE_V
}

/// Shifted piezo heights of the extend segment.
pub fn extend_heights() -> Vec<f64> {
    let n = POINTS_PER_SEGMENT;
    (0..n).map(|i| Z_MAX * i as f64 / (n - 1) as f64).collect()
}

fn segment_channels(extend: bool, curve: usize) -> (Vec<u8>, Vec<u8>) {
    let mut z = extend_heights();
    if !extend {
        z.reverse();
    }
    let ratio = if extend { 1.0 } else { RETRACT_RATIO };
    let scale = HEIGHT_ENCODER_MULTIPLIER * HEIGHT_NOMINAL_MULTIPLIER;

    let mut height = Vec::with_capacity(z.len() * 4);
    let mut deflection = Vec::with_capacity(z.len() * 4);
    for (i, zi) in z.iter().enumerate() {
        let raw_height = ((H0 - zi) / scale).round() as i32;
        height.extend_from_slice(&raw_height.to_be_bytes());

        let volts = ratio * elastic_deflection(*zi) / DEF_SENS_M_PER_V
            + BASELINE_OFFSET_V
            + noise(i + 7919 * curve + if extend { 0 } else { 104_729 });
        deflection.extend_from_slice(&(volts as f32).to_be_bytes());
    }
    (height, deflection)
}

fn root_header(closed_loop: bool, curves: usize) -> String {
    format!(
        "type=force-scan-map\n\
         force-scan-map.settings.force-settings.closed-loop={}\n\
         force-scan-map.indexes.max={}\n",
        closed_loop,
        curves.saturating_sub(1)
    )
}

fn shared_header() -> String {
    let mut s = String::new();
    let _ = writeln!(s, "lcd-info.0.channel.name=vDeflection");
    let _ = writeln!(s, "lcd-info.0.conversion-set.conversions.base=volts");
    let _ = writeln!(s, "lcd-info.0.conversion-set.conversion.distance.defined=true");
    let _ = writeln!(s, "lcd-info.0.conversion-set.conversion.distance.base-calibration-slot=volts");
    let _ = writeln!(s, "lcd-info.0.conversion-set.conversion.distance.scaling.multiplier={:e}", DEF_SENS_M_PER_V);
    let _ = writeln!(s, "lcd-info.0.conversion-set.conversion.distance.scaling.offset=0.0");
    let _ = writeln!(s, "lcd-info.0.conversion-set.conversion.force.defined=true");
    let _ = writeln!(s, "lcd-info.0.conversion-set.conversion.force.base-calibration-slot=distance");
    let _ = writeln!(s, "lcd-info.0.conversion-set.conversion.force.scaling.multiplier={}", SPRING_CONSTANT);
    let _ = writeln!(s, "lcd-info.0.conversion-set.conversion.force.scaling.offset=0.0");
    let _ = writeln!(s, "lcd-info.1.channel.name=measuredHeight");
    let _ = writeln!(s, "lcd-info.1.encoder.type=signedinteger");
    let _ = writeln!(s, "lcd-info.1.encoder.scaling.multiplier={:e}", HEIGHT_ENCODER_MULTIPLIER);
    let _ = writeln!(s, "lcd-info.1.encoder.scaling.offset=0.0");
    let _ = writeln!(s, "lcd-info.1.conversion-set.conversions.base=volts");
    let _ = writeln!(s, "lcd-info.1.conversion-set.conversion.nominal.defined=true");
    let _ = writeln!(s, "lcd-info.1.conversion-set.conversion.nominal.base-calibration-slot=volts");
    let _ = writeln!(s, "lcd-info.1.conversion-set.conversion.nominal.scaling.multiplier={:e}", HEIGHT_NOMINAL_MULTIPLIER);
    let _ = writeln!(s, "lcd-info.1.conversion-set.conversion.nominal.scaling.offset=0.0");
    for (i, style) in ["extend", "retract"].iter().enumerate() {
        let _ = writeln!(s, "force-segment-header-info.{}.settings.segment-settings.style={}", i, style);
        let _ = writeln!(
            s,
            "force-segment-header-info.{}.settings.segment-settings.duration={}",
            i, SEGMENT_DURATION_S
        );
    }
    s
}

fn segment_header(segment: usize) -> String {
    format!(
        "force-segment-header.num-points={}\n\
         force-segment-header-info.*={}\n\
         channel.vDeflection.data.file.name=channels/vDeflection.dat\n\
         channel.vDeflection.data.type=float-data\n\
         channel.vDeflection.lcd-info.*=0\n\
         channel.measuredHeight.data.file.name=channels/measuredHeight.dat\n\
         channel.measuredHeight.data.type=integer-data\n\
         channel.measuredHeight.lcd-info.*=1\n",
        POINTS_PER_SEGMENT, segment
    )
}

/// Bytes of a force map holding `curves` identical curves.
pub fn force_map_bytes(curves: usize, closed_loop: bool) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default();

    let add = |writer: &mut ZipWriter<Cursor<Vec<u8>>>, name: &str, data: &[u8]| {
        writer.start_file(name, options).unwrap();
        writer.write_all(data).unwrap();
    };

    add(&mut writer, "header.properties", root_header(closed_loop, curves).as_bytes());
    add(&mut writer, "shared-data/header.properties", shared_header().as_bytes());

    for curve in 0..curves {
        for (segment, extend) in [(0usize, true), (1usize, false)] {
            let dir = format!("index/{}/segments/{}", curve, segment);
            let (height, deflection) = segment_channels(extend, curve);
            add(
                &mut writer,
                &format!("{}/segment-header.properties", dir),
                segment_header(segment).as_bytes(),
            );
            add(&mut writer, &format!("{}/channels/vDeflection.dat", dir), &deflection);
            add(&mut writer, &format!("{}/channels/measuredHeight.dat", dir), &height);
        }
    }

    writer.finish().unwrap().into_inner()
}

/// Write a synthetic force map to `path`.
pub fn write_force_map(path: &Path, curves: usize) {
    std::fs::write(path, force_map_bytes(curves, false)).unwrap();
}
