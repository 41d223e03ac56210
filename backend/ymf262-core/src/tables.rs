//! Lookup tables shared by every operator and channel
//!
//! Timing tables are in milliseconds as listed in the YMF262 datasheet; everything derived from
//! them assumes output at [`SAMPLE_RATE`](ymf262_config::SAMPLE_RATE).

use std::array;
use std::f64::consts::PI;
use std::sync::LazyLock;

pub(crate) const SAMPLE_RATE: f64 = ymf262_config::SAMPLE_RATE as f64;

pub(crate) const WAVEFORM_LEN: usize = 1024;
pub(crate) const VIBRATO_TABLE_LEN: usize = 8192;

const VIBRATO_SEGMENT_LEN: usize = VIBRATO_TABLE_LEN / 8;

// Repetition rate of the tremolo triangle wave in Hz
const TREMOLO_FREQUENCY: f64 = 3.7;

// Tremolo depth in dB for DAM=0 and DAM=1
const TREMOLO_DEPTHS: [f64; 2] = [-1.0, -4.8];

pub(crate) const MULTIPLIER_TABLE: [f64; 16] =
    [0.5, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 10.0, 12.0, 12.0, 15.0, 15.0];

// Feedback modulation in full phase turns, indexed by the 3-bit FB field
pub(crate) const FEEDBACK_TABLE: [f64; 8] =
    [0.0, 1.0 / 32.0, 1.0 / 16.0, 1.0 / 8.0, 1.0 / 4.0, 1.0 / 2.0, 1.0, 2.0];

// Indexed by [KSR][key scale number]
pub(crate) const RATE_OFFSET_TABLE: [[u8; 16]; 2] = [
    [0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3],
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15],
];

// Attenuation in dB for KSL=1 (3 dB/octave), indexed by [top 4 bits of F-number][block]
#[rustfmt::skip]
pub(crate) const KEY_SCALE_LEVEL_TABLE: [[f64; 8]; 16] = [
    [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [0.0, 0.0, 0.0, 0.0, 0.0, -3.0, -6.0, -9.0],
    [0.0, 0.0, 0.0, 0.0, -3.0, -6.0, -9.0, -12.0],
    [0.0, 0.0, 0.0, -1.875, -4.875, -7.875, -10.875, -13.875],

    [0.0, 0.0, 0.0, -3.0, -6.0, -9.0, -12.0, -15.0],
    [0.0, 0.0, -1.125, -4.125, -7.125, -10.125, -13.125, -16.125],
    [0.0, 0.0, -1.875, -4.875, -7.875, -10.875, -13.875, -16.875],
    [0.0, 0.0, -2.625, -5.625, -8.625, -11.625, -14.625, -17.625],

    [0.0, 0.0, -3.0, -6.0, -9.0, -12.0, -15.0, -18.0],
    [0.0, -0.750, -3.750, -6.750, -9.750, -12.750, -15.750, -18.750],
    [0.0, -1.125, -4.125, -7.125, -10.125, -13.125, -16.125, -19.125],
    [0.0, -1.500, -4.500, -7.500, -10.500, -13.500, -16.500, -19.500],

    [0.0, -1.875, -4.875, -7.875, -10.875, -13.875, -16.875, -19.875],
    [0.0, -2.250, -5.250, -8.250, -11.250, -14.250, -17.250, -20.250],
    [0.0, -2.625, -5.625, -8.625, -11.625, -14.625, -17.625, -20.625],
    [0.0, -3.0, -6.0, -9.0, -12.0, -15.0, -18.0, -21.0],
];

const INF: f64 = f64::INFINITY;

// (0% to 100% time, 10% to 90% time) in ms, indexed by actual attack rate
#[rustfmt::skip]
pub(crate) const ATTACK_TIME_TABLE: [[f64; 2]; 64] = [
    [INF, INF], [INF, INF], [INF, INF], [INF, INF],
    [2826.24, 1482.75], [2252.80, 1155.07], [1884.16, 991.23], [1597.44, 868.35],
    [1413.12, 741.38], [1126.40, 577.54], [942.08, 495.62], [798.72, 434.18],
    [706.56, 370.69], [563.20, 288.77], [471.04, 247.81], [399.36, 217.09],

    [353.28, 185.34], [281.60, 144.38], [235.52, 123.90], [199.68, 108.54],
    [176.76, 92.67], [140.80, 72.19], [117.76, 61.95], [99.84, 54.27],
    [88.32, 46.34], [70.40, 36.10], [58.88, 30.98], [49.92, 27.14],
    [44.16, 23.17], [35.20, 18.05], [29.44, 15.49], [24.96, 13.57],

    [22.08, 11.58], [17.60, 9.02], [14.72, 7.74], [12.48, 6.78],
    [11.04, 5.79], [8.80, 4.51], [7.36, 3.87], [6.24, 3.39],
    [5.52, 2.90], [4.40, 2.26], [3.68, 1.94], [3.12, 1.70],
    [2.76, 1.45], [2.20, 1.13], [1.84, 0.97], [1.56, 0.85],

    [1.40, 0.73], [1.12, 0.61], [0.92, 0.49], [0.80, 0.43],
    [0.70, 0.37], [0.56, 0.31], [0.46, 0.26], [0.42, 0.22],
    [0.38, 0.19], [0.30, 0.14], [0.24, 0.11], [0.20, 0.11],
    [0.00, 0.00], [0.00, 0.00], [0.00, 0.00], [0.00, 0.00],
];

// (0% to 100% time, 10% to 90% time) in ms, indexed by actual decay or release rate
#[rustfmt::skip]
pub(crate) const DECAY_RELEASE_TIME_TABLE: [[f64; 2]; 64] = [
    [INF, INF], [INF, INF], [INF, INF], [INF, INF],
    [39280.64, 8212.48], [31416.32, 6574.08], [26173.44, 5509.12], [22446.08, 4730.88],
    [19640.32, 4106.24], [15708.16, 3287.04], [13086.72, 2754.56], [11223.04, 2365.44],
    [9820.16, 2053.12], [7854.08, 1643.52], [6543.36, 1377.28], [5611.52, 1182.72],

    [4910.08, 1026.56], [3927.04, 821.76], [3271.68, 688.64], [2805.76, 591.36],
    [2455.04, 513.28], [1936.52, 410.88], [1635.84, 344.34], [1402.88, 295.68],
    [1227.52, 256.64], [981.76, 205.44], [817.92, 172.16], [701.44, 147.84],
    [613.76, 128.32], [490.88, 102.72], [488.96, 86.08], [350.72, 73.92],

    [306.88, 64.16], [245.44, 51.36], [204.48, 43.04], [175.36, 36.96],
    [153.44, 32.08], [122.72, 25.68], [102.24, 21.52], [87.68, 18.48],
    [76.72, 16.04], [61.36, 12.84], [51.12, 10.76], [43.84, 9.24],
    [38.36, 8.02], [30.68, 6.42], [25.56, 5.38], [21.92, 4.62],

    [19.20, 4.02], [15.36, 3.22], [12.80, 2.68], [10.96, 2.32],
    [9.60, 2.02], [7.68, 1.62], [6.40, 1.35], [5.48, 1.15],
    [4.80, 1.01], [3.84, 0.81], [3.20, 0.69], [2.74, 0.58],
    [2.40, 0.51], [2.40, 0.51], [2.40, 0.51], [2.40, 0.51],
];

/// Per-sample increment that moves linearly from `begin` to `end` over `period` seconds
pub(crate) fn calculate_increment(begin: f64, end: f64, period: f64) -> f64 {
    (end - begin) / SAMPLE_RATE * (1.0 / period)
}

pub(crate) type Waveform = [f64; WAVEFORM_LEN];

pub(crate) static WAVEFORMS: LazyLock<[Waveform; 8]> = LazyLock::new(|| {
    let sine: Waveform = array::from_fn(|i| (i as f64 * 2.0 * PI / WAVEFORM_LEN as f64).sin());
    let half = WAVEFORM_LEN / 2;
    let quarter = WAVEFORM_LEN / 4;

    // Exponential wave is built from both ends in 1/16 steps
    let mut exponential = [0.0; WAVEFORM_LEN];
    for i in 0..half {
        let x = i as f64 / 16.0;
        exponential[i] = 2.0_f64.powf(-x);
        exponential[WAVEFORM_LEN - 1 - i] = -(2.0_f64.powf(-(x + 1.0 / 16.0)));
    }

    [
        // Sine
        sine,
        // Half sine
        array::from_fn(|i| if i < half { sine[i] } else { 0.0 }),
        // Absolute sine
        array::from_fn(|i| sine[i % half]),
        // Quarter sine pulses
        array::from_fn(|i| if i % half < quarter { sine[i % half] } else { 0.0 }),
        // Double frequency half sine
        array::from_fn(|i| if i < half { sine[2 * i] } else { 0.0 }),
        // Double frequency absolute sine
        array::from_fn(|i| if i < half { sine[2 * (i % quarter)] } else { 0.0 }),
        // Square
        array::from_fn(|i| if i < half { 1.0 } else { -1.0 }),
        exponential,
    ]
});

// Phase increment multipliers over one vibrato cycle: eight segments of 1024 samples each
// following 1, sqrt(d), d, sqrt(d), 1, 1/sqrt(d), 1/d, 1/sqrt(d)
pub(crate) static VIBRATO_TABLES: LazyLock<[Vec<f64>; 2]> = LazyLock::new(|| {
    let cent = 2.0_f64.powf(1.0 / 12.0).powf(1.0 / 100.0);

    // 7 cents for DVB=0, 14 cents for DVB=1
    [7, 14].map(|cents| {
        let depth = cent.powi(cents);
        let segments = [
            1.0,
            depth.sqrt(),
            depth,
            depth.sqrt(),
            1.0,
            1.0 / depth.sqrt(),
            1.0 / depth,
            1.0 / depth.sqrt(),
        ];
        (0..VIBRATO_TABLE_LEN).map(|i| segments[i / VIBRATO_SEGMENT_LEN]).collect()
    })
});

// Tremolo attenuation in dB, one triangle cycle starting at full depth and rising to 0 dB
pub(crate) static TREMOLO_TABLES: LazyLock<[Vec<f64>; 2]> = LazyLock::new(|| {
    let len = (SAMPLE_RATE / TREMOLO_FREQUENCY).floor() as usize;

    // Each half of the triangle lasts half of a tremolo period
    let increments = TREMOLO_DEPTHS
        .map(|depth| calculate_increment(depth, 0.0, 1.0 / (2.0 * TREMOLO_FREQUENCY)));

    let mut tables = [vec![0.0; len], vec![0.0; len]];
    for (table, depth) in tables.iter_mut().zip(TREMOLO_DEPTHS) {
        table[0] = depth;
    }

    // Both tables advance in lockstep using the DAM=0 table as the loop condition
    let mut i = 0;
    while tables[0][i] < 0.0 && i < len - 1 {
        i += 1;
        for (table, increment) in tables.iter_mut().zip(increments) {
            table[i] = table[i - 1] + increment;
        }
    }

    while tables[0][i] > TREMOLO_DEPTHS[0] && i < len - 1 {
        i += 1;
        for (table, increment) in tables.iter_mut().zip(increments) {
            table[i] = table[i - 1] - increment;
        }
    }

    tables
});

/// Build every table up front so that no lazy initialization happens on the audio path
pub(crate) fn initialize() {
    LazyLock::force(&WAVEFORMS);
    LazyLock::force(&VIBRATO_TABLES);
    LazyLock::force(&TREMOLO_TABLES);
}
