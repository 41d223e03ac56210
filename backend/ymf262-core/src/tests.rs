use super::*;
use crate::tables::{TREMOLO_TABLES, VIBRATO_TABLE_LEN};
use test_log::test;

// Fastest attack, held at full volume, MULT=1
fn init_operator(chip: &mut Ymf262, array: u8, offset: u8) {
    chip.write(array, 0x20 + offset, 0x21);
    chip.write(array, 0x40 + offset, 0x00);
    chip.write(array, 0x60 + offset, 0xFF);
    chip.write(array, 0x80 + offset, 0x0F);
}

// F-number 0x200 in block 4 advances the phase by exactly 1/128 per sample
fn key_on_tone(chip: &mut Ymf262, array: u8, channel: u8) {
    chip.write(array, 0xA0 + channel, 0x00);
    chip.write(array, 0xB0 + channel, 0x32);
}

fn render(chip: &mut Ymf262, samples: usize) -> Vec<[i16; OUTPUT_CHANNELS]> {
    (0..samples).map(|_| chip.read()).collect()
}

#[test]
fn fresh_chip_is_silent() {
    let mut chip = Ymf262::new(Ymf262Config::deterministic(1));
    assert!(render(&mut chip, 1000).iter().all(|&sample| sample == [0; 4]));

    chip.write(1, 0x05, 0x01);
    assert!(render(&mut chip, 1000).iter().all(|&sample| sample == [0; 4]));
}

#[test]
fn basic_tone_is_periodic() {
    let mut chip = Ymf262::new(Ymf262Config::deterministic(1));
    init_operator(&mut chip, 0, 0x00);
    init_operator(&mut chip, 0, 0x03);
    key_on_tone(&mut chip, 0, 0);

    let samples = render(&mut chip, 1024);
    assert!(samples.iter().any(|&sample| sample != [0; 4]));

    for n in 0..samples.len() - 128 {
        assert_eq!(samples[n], samples[n + 128], "sample {n}");
        // No panning in OPL2 mode
        assert_eq!(samples[n], [samples[n][0]; 4]);
    }
}

#[test]
fn key_off_releases_to_silence() {
    let mut chip = Ymf262::new(Ymf262Config::deterministic(1));
    init_operator(&mut chip, 0, 0x00);
    init_operator(&mut chip, 0, 0x03);
    key_on_tone(&mut chip, 0, 0);
    let _ = render(&mut chip, 100);

    chip.write(0, 0xB0, 0x12);
    assert_eq!(chip.operator_envelope_stage(0, 0x03), Some(EnvelopeStage::Release));

    // RR=15 releases from 0 dB to the floor within a few hundred samples
    let _ = render(&mut chip, 5000);
    assert_eq!(chip.operator_envelope_stage(0, 0x03), Some(EnvelopeStage::Off));
    assert!(render(&mut chip, 100).iter().all(|&sample| sample == [0; 4]));
}

#[test]
fn register_writes_read_back() {
    let mut chip = Ymf262::new(Ymf262Config::deterministic(1));

    for register in 0..REGISTER_FILE_LEN as u16 {
        let value = (register as u8).wrapping_mul(7).wrapping_add(3);
        chip.write_register(register, value);
        assert_eq!(chip.register(register), Some(value), "register {register:03X}");
    }

    assert_eq!(chip.register(REGISTER_FILE_LEN as u16), None);
}

#[test]
fn out_of_range_writes_are_ignored() {
    let mut chip = Ymf262::new(Ymf262Config::deterministic(1));
    chip.write(2, 0x05, 0x01);
    chip.write(3, 0x20, 0xFF);
    chip.write_register(0x2BD, 0xFF);

    assert!(!chip.is_opl3_mode());
    assert!(!chip.is_rhythm_mode());
    assert!((0..REGISTER_FILE_LEN as u16).all(|register| chip.register(register) == Some(0)));
}

#[test]
fn rhythm_mode_remaps_array_0_only() {
    let mut chip = Ymf262::new(Ymf262Config::deterministic(1));
    chip.write(1, 0x05, 0x01);
    chip.write(0, 0xBD, 0x20);

    assert!(chip.is_rhythm_mode());
    assert_eq!(chip.channels.slot(0, 6), ChannelId::BASS_DRUM);
    assert_eq!(chip.channels.slot(0, 7), ChannelId::HIGH_HAT_SNARE_DRUM);
    assert_eq!(chip.channels.slot(0, 8), ChannelId::TOM_TOM_TOP_CYMBAL);
    for index in 6..9 {
        assert_eq!(chip.channels.slot(1, index), ChannelId::two_op(1, index));
    }

    chip.write(0, 0xBD, 0x00);
    assert!(!chip.is_rhythm_mode());
    for index in 6..9 {
        assert_eq!(chip.channels.slot(0, index), ChannelId::two_op(0, index));
    }
}

#[test]
fn bass_drum_keys_both_operators() {
    let mut chip = Ymf262::new(Ymf262Config::deterministic(1));
    init_operator(&mut chip, 0, 0x10);
    init_operator(&mut chip, 0, 0x13);
    chip.write(0, 0xA6, 0x00);
    chip.write(0, 0xB6, 0x12);

    chip.write(0, 0xBD, 0x20);
    assert_eq!(chip.operator_envelope_stage(0, 0x10), Some(EnvelopeStage::Off));

    chip.write(0, 0xBD, 0x30);
    assert_eq!(chip.operator_envelope_stage(0, 0x10), Some(EnvelopeStage::Attack));
    assert_eq!(chip.operator_envelope_stage(0, 0x13), Some(EnvelopeStage::Attack));
    assert!(render(&mut chip, 256).iter().any(|&sample| sample != [0; 4]));

    chip.write(0, 0xBD, 0x20);
    assert_eq!(chip.operator_envelope_stage(0, 0x10), Some(EnvelopeStage::Release));
    assert_eq!(chip.operator_envelope_stage(0, 0x13), Some(EnvelopeStage::Release));
}

#[test]
fn leaving_rhythm_mode_releases_held_drums() {
    let mut chip = Ymf262::new(Ymf262Config::deterministic(1));
    init_operator(&mut chip, 0, 0x10);
    init_operator(&mut chip, 0, 0x13);
    chip.write(0, 0xA6, 0x00);
    chip.write(0, 0xB6, 0x12);

    chip.write(0, 0xBD, 0x20);
    init_operator(&mut chip, 0, 0x11);

    // Bass drum and high hat held
    chip.write(0, 0xBD, 0x31);
    assert!(render(&mut chip, 256).iter().any(|&sample| sample != [0; 4]));

    // Rhythm mode and both key bits cleared by the same write
    chip.write(0, 0xBD, 0x00);
    assert!(!chip.is_rhythm_mode());
    assert_eq!(chip.operator_envelope_stage(0, 0x10), Some(EnvelopeStage::Release));
    assert_eq!(chip.operator_envelope_stage(0, 0x13), Some(EnvelopeStage::Release));
    assert_eq!(
        chip.operators.get(OperatorId::HIGH_HAT).envelope_stage(),
        EnvelopeStage::Release
    );

    // Channel 6 is not keyed as a melodic channel, so the release runs out to silence
    let _ = render(&mut chip, 5000);
    assert_eq!(chip.operator_envelope_stage(0, 0x13), Some(EnvelopeStage::Off));
    assert!(render(&mut chip, 256).iter().all(|&sample| sample == [0; 4]));

    // Re-entering rhythm mode with the key bit still set keys the drum again
    chip.write(0, 0xBD, 0x10);
    assert_eq!(chip.operator_envelope_stage(0, 0x13), Some(EnvelopeStage::Off));
    chip.write(0, 0xBD, 0x30);
    assert_eq!(chip.operator_envelope_stage(0, 0x13), Some(EnvelopeStage::Attack));
}

#[test]
fn rhythm_key_bits_are_ignored_outside_rhythm_mode() {
    let mut chip = Ymf262::new(Ymf262Config::deterministic(1));
    init_operator(&mut chip, 0, 0x10);
    init_operator(&mut chip, 0, 0x13);

    chip.write(0, 0xBD, 0x10);
    assert_eq!(chip.operator_envelope_stage(0, 0x10), Some(EnvelopeStage::Off));
    assert_eq!(chip.operator_envelope_stage(0, 0x13), Some(EnvelopeStage::Off));
}

#[test]
fn rhythm_operators_take_over_register_offsets() {
    let mut chip = Ymf262::new(Ymf262Config::deterministic(1));
    chip.write(0, 0xBD, 0x20);
    init_operator(&mut chip, 0, 0x11);

    // Offset 0x11 now addresses the high hat, which is keyed by the rhythm register
    chip.write(0, 0xBD, 0x21);
    assert_eq!(chip.operator_envelope_stage(0, 0x11), Some(EnvelopeStage::Attack));

    chip.write(0, 0xBD, 0x00);
    assert_eq!(chip.operator_envelope_stage(0, 0x11), Some(EnvelopeStage::Off));
}

#[test]
fn lfsr_noise_is_reproducible() {
    let setup = || {
        let mut chip = Ymf262::new(Ymf262Config::deterministic(0x5A5A));
        chip.write(0, 0xBD, 0x20);
        for offset in [0x11, 0x12, 0x14, 0x15] {
            init_operator(&mut chip, 0, offset);
        }
        for channel in [7, 8] {
            chip.write(0, 0xA0 + channel, 0x81);
            chip.write(0, 0xB0 + channel, 0x0A);
        }
        // High hat, snare drum, top cymbal
        chip.write(0, 0xBD, 0x2B);
        chip
    };

    let mut a = setup();
    let mut b = setup();
    let a_samples = render(&mut a, 5000);
    let b_samples = render(&mut b, 5000);

    assert!(a_samples.iter().any(|&sample| sample != [0; 4]));
    assert_eq!(a_samples, b_samples);
}

#[test]
fn legacy_mode_masks_waveform_select() {
    let tone = |waveform: u8| {
        let mut chip = Ymf262::new(Ymf262Config::deterministic(1));
        init_operator(&mut chip, 0, 0x00);
        init_operator(&mut chip, 0, 0x03);
        chip.write(0, 0xE3, waveform);
        key_on_tone(&mut chip, 0, 0);
        let samples = render(&mut chip, 256);
        (chip.register(0x0E3), samples)
    };

    let (register, masked) = tone(0x06);
    let (_, plain) = tone(0x02);
    assert_eq!(register, Some(0x06));
    assert_eq!(masked, plain);
}

#[test]
fn four_op_pairing_requires_opl3_mode() {
    let mut chip = Ymf262::new(Ymf262Config::deterministic(1));
    chip.write(1, 0x04, 0x09);
    assert_eq!(chip.four_op_connections(), 0x09);
    assert_eq!(chip.channels.slot(0, 0), ChannelId::two_op(0, 0));

    chip.write(1, 0x05, 0x01);
    assert!(chip.is_opl3_mode());
    assert_eq!(chip.channels.slot(0, 0), ChannelId::four_op(0, 0));
    assert_eq!(chip.channels.slot(0, 3), ChannelId::DISABLED);
    assert_eq!(chip.channels.slot(1, 0), ChannelId::four_op(1, 0));
    assert_eq!(chip.channels.slot(1, 3), ChannelId::DISABLED);
    assert_eq!(chip.channels.slot(0, 1), ChannelId::two_op(0, 1));
    assert_eq!(chip.channels.slot(0, 4), ChannelId::two_op(0, 4));

    chip.write(1, 0x04, 0x00);
    assert_eq!(chip.channels.slot(0, 0), ChannelId::two_op(0, 0));
    assert_eq!(chip.channels.slot(0, 3), ChannelId::two_op(0, 3));

    chip.write(1, 0x04, 0x3F);
    chip.write(1, 0x05, 0x00);
    assert!(!chip.is_opl3_mode());
    for array in 0..2 {
        for index in 0..6 {
            assert_eq!(chip.channels.slot(array, index), ChannelId::two_op(array, index));
        }
    }
}

#[test]
fn entering_opl3_mode_enables_all_outputs_once() {
    let mut chip = Ymf262::new(Ymf262Config::deterministic(1));
    chip.write(0, 0xC0, 0x01);
    chip.write(1, 0xC8, 0x0E);

    chip.write(1, 0x05, 0x01);
    assert_eq!(chip.register(0x0C0), Some(0xF1));
    assert_eq!(chip.register(0x1C8), Some(0xFE));

    // Only the OFF -> ON transition forces the output bits
    chip.write(0, 0xC0, 0x01);
    chip.write(1, 0x05, 0x01);
    assert_eq!(chip.register(0x0C0), Some(0x01));
}

#[test]
fn second_array_is_only_mixed_in_opl3_mode() {
    let mut chip = Ymf262::new(Ymf262Config::deterministic(1));
    init_operator(&mut chip, 1, 0x00);
    init_operator(&mut chip, 1, 0x03);
    key_on_tone(&mut chip, 1, 0);

    assert!(render(&mut chip, 256).iter().all(|&sample| sample == [0; 4]));

    chip.write(1, 0x05, 0x01);
    let samples = render(&mut chip, 256);
    assert!(samples.iter().any(|&sample| sample != [0; 4]));
}

#[test]
fn panning_selects_output_channels() {
    let mut chip = Ymf262::new(Ymf262Config::deterministic(1));
    chip.write(1, 0x05, 0x01);
    init_operator(&mut chip, 0, 0x00);
    init_operator(&mut chip, 0, 0x03);
    // Channels C and D only
    chip.write(0, 0xC0, 0xC0);
    key_on_tone(&mut chip, 0, 0);

    let samples = render(&mut chip, 256);
    assert!(samples.iter().any(|sample| sample[2] != 0));
    for sample in samples {
        assert_eq!([sample[0], sample[1]], [0, 0]);
        assert_eq!(sample[2], sample[3]);
    }
}

#[test]
fn lfo_positions_wrap() {
    let mut chip = Ymf262::new(Ymf262Config::deterministic(1));
    let _ = render(&mut chip, VIBRATO_TABLE_LEN - 1);
    assert_eq!(chip.vibrato_index(), (VIBRATO_TABLE_LEN - 1) as u16);

    let _ = chip.read();
    assert_eq!(chip.vibrato_index(), 0);
    assert_eq!(chip.tremolo_index(), VIBRATO_TABLE_LEN as u16);

    let tremolo_len = TREMOLO_TABLES[0].len();
    let _ = render(&mut chip, tremolo_len - VIBRATO_TABLE_LEN);
    assert_eq!(chip.tremolo_index(), 0);
}

#[test]
fn reset_restores_power_on_state() {
    let mut chip = Ymf262::new(Ymf262Config::deterministic(7));
    chip.write(1, 0x05, 0x01);
    chip.write(0, 0xBD, 0xE0);
    init_operator(&mut chip, 0, 0x00);
    init_operator(&mut chip, 0, 0x03);
    key_on_tone(&mut chip, 0, 0);
    let _ = render(&mut chip, 10);

    chip.reset();

    assert_eq!(chip.config(), Ymf262Config::deterministic(7));
    assert!(!chip.is_opl3_mode());
    assert!(!chip.is_rhythm_mode());
    assert_eq!(chip.vibrato_index(), 0);
    assert_eq!(chip.register(0x0B0), Some(0));
    assert!(render(&mut chip, 100).iter().all(|&sample| sample == [0; 4]));
}

#[test]
fn reload_config_keeps_register_state() {
    let mut chip = Ymf262::new(Ymf262Config::default());
    chip.write(0, 0xA0, 0x44);

    chip.reload_config(Ymf262Config::deterministic(3));

    assert_eq!(chip.config().rhythm_noise, RhythmNoise::Lfsr);
    assert_eq!(chip.register(0x0A0), Some(0x44));
}
