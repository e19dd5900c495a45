//! End-to-end rendering scenarios.
//!
//! Each test builds a declarative synthesizer graph, produces PCM through
//! a voice instance and checks exact sample values or byte-level
//! equivalences: silence shape, splittability, determinism, clamping,
//! mix modes and the behavior of every source kind.

use ostinato::prelude::*;
use std::f64::consts::TAU;
use std::sync::Arc;

// =============================================================================
// Helpers
// =============================================================================

fn instance_for(synthesizer: &Arc<Synthesizer>) -> SynthesizerInstance {
    SynthesizerInstance::with_synthesizer(SharedBufferPool::new(), synthesizer.clone())
}

fn produce(instance: &SynthesizerInstance, offset: u64, samples: usize) -> Vec<u8> {
    instance.prepare().unwrap();
    let mut buffer = vec![0u8; samples * instance.generate_sample_size()];
    instance.produce(&mut buffer, offset, samples).unwrap();
    buffer
}

fn to_i16(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect()
}

fn wave(frequency: f32) -> SourceDef {
    SourceDef::Wave(WaveDef {
        min_frequency: frequency,
        max_frequency: frequency,
        ..WaveDef::default()
    })
}

fn constant_controller(value: f32) -> ControllerDef {
    ControllerDef {
        minimum: 0.0,
        maximum: 1.0,
        clamp: true,
        curve: CurveBezier::constant(value),
    }
}

fn identity_link(controller: i32) -> LinkDef {
    LinkDef {
        controller,
        ..LinkDef::default()
    }
}

fn mono16(sources: Vec<SourceDef>) -> Arc<Synthesizer> {
    Arc::new(Synthesizer::with_desc(SynthesizerDesc {
        sources,
        ..SynthesizerDesc::default()
    }))
}

fn mono16_asset(path: &str, values: Vec<i16>) -> Arc<SoundAsset> {
    let info = SoundInfo {
        path: path.into(),
        channel_count: 1,
        bytes_per_sample: 2,
        sample_rate: 44100,
        sample_count: values.len() as u32,
    };
    Arc::new(SoundAsset::from_pcm(info, PcmData::Mono16(values)))
}

// =============================================================================
// Silence shape
// =============================================================================

/// A disabled source keeps the whole synthesizer silent: produce writes
/// exactly samples x channels x bytes-per-sample zero bytes.
#[test]
fn test_disabled_source_produces_zero_bytes() {
    let synthesizer = Arc::new(Synthesizer::with_desc(SynthesizerDesc {
        channel_count: 2,
        bytes_per_sample: 1,
        sources: vec![SourceDef::Wave(WaveDef {
            common: SourceCommonDef {
                enabled: false,
                ..SourceCommonDef::default()
            },
            ..WaveDef::default()
        })],
        ..SynthesizerDesc::default()
    }));

    let instance = instance_for(&synthesizer);
    let bytes = produce(&instance, 0, 8000);
    assert_eq!(bytes.len(), 16000);
    assert!(bytes.iter().all(|&b| b == 0));
}

#[test]
fn test_instance_without_synthesizer_is_silent() {
    let instance = SynthesizerInstance::new(SharedBufferPool::new());
    let bytes = produce(&instance, 0, 500);
    assert_eq!(bytes.len(), 500);
    assert!(bytes.iter().all(|&b| b == 0));
}

// =============================================================================
// Wave sources
// =============================================================================

/// 440 Hz sine, mono, 16-bit, 44100 Hz: sample i is
/// round(sin(2 pi 440 i / 44100) * 32767) up to float phase accumulation.
#[test]
fn test_sine_matches_closed_form() {
    let synthesizer = mono16(vec![wave(440.0)]);
    let instance = instance_for(&synthesizer);
    let samples = to_i16(&produce(&instance, 0, 4410));

    for (i, &sample) in samples.iter().enumerate() {
        let ideal = (TAU * 440.0 * i as f64 / 44100.0).sin() * 32767.0;
        let tolerance = if i < 200 { 8.0 } else { 48.0 };
        assert!(
            (sample as f64 - ideal.round()).abs() <= tolerance,
            "sample {i}: got {sample}, ideal {ideal:.1}"
        );
    }
}

#[test]
fn test_square_wave_is_bipolar_full_scale() {
    let synthesizer = mono16(vec![SourceDef::Wave(WaveDef {
        wave_type: WaveType::Square,
        min_frequency: 100.0,
        max_frequency: 100.0,
        ..WaveDef::default()
    })]);
    let instance = instance_for(&synthesizer);
    let samples = to_i16(&produce(&instance, 0, 441));

    assert!(samples.iter().all(|&s| s == 32767 || s == -32767));
    assert!(samples.contains(&32767) && samples.contains(&-32767));
}

// =============================================================================
// Splittability and determinism
// =============================================================================

/// Producing a run in two contiguous sub-calls yields byte-identical
/// output to producing it at once.
#[test]
fn test_splittability() {
    let build = || {
        let synthesizer = Arc::new(Synthesizer::with_desc(SynthesizerDesc {
            controllers: vec![ControllerDef::default()],
            links: vec![identity_link(0)],
            sources: vec![SourceDef::Group(GroupDef {
                application: GroupApplication::Select,
                sources: vec![wave(440.0), wave(660.0)],
                target_select: TargetDef::with_link(0),
                ..GroupDef::default()
            })],
            ..SynthesizerDesc::default()
        }));
        let instance = instance_for(&synthesizer);
        instance.set_controller(
            0,
            ControllerDef {
                curve: CurveBezier::from_points(
                    CurveInterpolation::Linear,
                    &[(0.0, 0.0), (0.1, 1.0)],
                ),
                ..ControllerDef::default()
            },
        );
        instance
    };

    let whole = produce(&build(), 0, 3000);

    let split = build();
    let mut first = produce(&split, 0, 1280);
    let second = produce(&split, 1280, 1720);
    first.extend_from_slice(&second);

    assert_eq!(whole, first);
}

/// Two instances of the same definition render byte-identical output.
#[test]
fn test_determinism_across_instances() {
    let synthesizer = mono16(vec![wave(523.25), wave(311.13)]);
    let a = instance_for(&synthesizer);
    let b = instance_for(&synthesizer);
    assert_eq!(produce(&a, 0, 2000), produce(&b, 0, 2000));
}

// =============================================================================
// Format clamping
// =============================================================================

/// Over-unity volume saturates instead of wrapping.
#[test]
fn test_overdriven_volume_saturates() {
    let synthesizer = mono16(vec![SourceDef::Wave(WaveDef {
        common: SourceCommonDef {
            min_volume: 4.0,
            max_volume: 4.0,
            ..SourceCommonDef::default()
        },
        ..WaveDef::default()
    })]);
    let instance = instance_for(&synthesizer);
    let samples = to_i16(&produce(&instance, 0, 4410));

    assert_eq!(*samples.iter().max().unwrap(), 32767);
    assert_eq!(*samples.iter().min().unwrap(), -32768);
    for (i, &sample) in samples.iter().enumerate() {
        let ideal = ((TAU * 440.0 * i as f64 / 44100.0).sin() * 4.0 * 32767.0)
            .round()
            .clamp(-32768.0, 32767.0);
        assert!(
            (sample as f64 - ideal).abs() <= 64.0,
            "sample {i}: got {sample}, ideal {ideal}"
        );
    }
}

// =============================================================================
// Mix modes
// =============================================================================

/// Add mixes sum; a blend source with full blend factor replaces what
/// was accumulated before it.
#[test]
fn test_add_mix_sums_sources() {
    let single = to_i16(&produce(&instance_for(&mono16(vec![wave(440.0)])), 0, 1000));
    let double = to_i16(&produce(
        &instance_for(&mono16(vec![wave(440.0), wave(440.0)])),
        0,
        1000,
    ));

    for i in 0..1000 {
        let expected = (2 * single[i] as i32).clamp(-32768, 32767);
        assert!(
            (double[i] as i32 - expected).abs() <= 2,
            "sample {i}: {} vs {expected}",
            double[i]
        );
    }
}

#[test]
fn test_blend_mix_with_full_factor_replaces() {
    let square = SourceDef::Wave(WaveDef {
        common: SourceCommonDef {
            mix_mode: MixMode::Blend,
            ..SourceCommonDef::default()
        },
        wave_type: WaveType::Square,
        min_frequency: 220.0,
        max_frequency: 220.0,
        ..WaveDef::default()
    });
    let square_only = SourceDef::Wave(WaveDef {
        wave_type: WaveType::Square,
        min_frequency: 220.0,
        max_frequency: 220.0,
        ..WaveDef::default()
    });

    let blended = produce(&instance_for(&mono16(vec![wave(440.0), square])), 0, 1000);
    let reference = produce(&instance_for(&mono16(vec![square_only])), 0, 1000);
    assert_eq!(blended, reference);
}

/// A silent blend source still erases the accumulated mix when its
/// blend factor is full.
#[test]
fn test_silent_blend_source_erases_mix() {
    let silent_blend = SourceDef::Wave(WaveDef {
        common: SourceCommonDef {
            enabled: false,
            mix_mode: MixMode::Blend,
            ..SourceCommonDef::default()
        },
        ..WaveDef::default()
    });

    let bytes = produce(
        &instance_for(&mono16(vec![wave(440.0), silent_blend])),
        0,
        500,
    );
    assert!(bytes.iter().all(|&b| b == 0));
}

// =============================================================================
// Pool hygiene
// =============================================================================

/// Every buffer claimed during a produce call is back in the pool when
/// the call returns.
#[test]
fn test_pool_in_use_count_returns_to_zero() {
    let pool = SharedBufferPool::new();
    let synthesizer = Arc::new(Synthesizer::with_desc(SynthesizerDesc {
        controllers: vec![ControllerDef::default()],
        links: vec![identity_link(0)],
        sources: vec![SourceDef::Group(GroupDef {
            application: GroupApplication::Select,
            sources: vec![wave(440.0), wave(660.0), wave(880.0)],
            target_select: TargetDef::with_link(0),
            ..GroupDef::default()
        })],
        ..SynthesizerDesc::default()
    }));
    let instance = SynthesizerInstance::with_synthesizer(pool.clone(), synthesizer);
    instance.set_controller(0, constant_controller(0.3));

    produce(&instance, 0, 1024);
    assert_eq!(pool.in_use(), 0);
    produce(&instance, 1024, 1024);
    assert_eq!(pool.in_use(), 0);
}

// =============================================================================
// Sound sources
// =============================================================================

/// A looping 100-sample ramp at speed 1 repeats exactly, and rendering
/// from a later offset matches the corresponding window of a longer run.
#[test]
fn test_looping_sound_repeats_ramp() {
    let ramp: Vec<i16> = (0..100).map(|i| -16000 + (i as i32 * 32000 / 99) as i16).collect();
    let build = || {
        let synthesizer = mono16(vec![SourceDef::Sound(SoundDef {
            sound: Some(mono16_asset("ramp", ramp.clone())),
            looping: true,
            ..SoundDef::default()
        })]);
        instance_for(&synthesizer)
    };

    let samples = to_i16(&produce(&build(), 0, 250));
    for (i, &sample) in samples.iter().enumerate() {
        assert!(
            (sample as i32 - ramp[i % 100] as i32).abs() <= 1,
            "sample {i}: {sample} vs {}",
            ramp[i % 100]
        );
    }

    // a fresh voice at offset 100 matches samples 100..150 of a longer run
    let long = produce(&build(), 0, 300);
    let windowed = produce(&build(), 100, 50);
    assert_eq!(windowed, &long[200..300]);
}

/// A non-looping sound stops at its last sample and stays silent until
/// the play target dips below the pause threshold and rises again.
#[test]
fn test_one_shot_sound_stops_and_retriggers() {
    let build_synth = || {
        Arc::new(Synthesizer::with_desc(SynthesizerDesc {
            controllers: vec![ControllerDef::default()],
            links: vec![identity_link(0)],
            sources: vec![SourceDef::Sound(SoundDef {
                sound: Some(mono16_asset("hit", vec![8000; 40])),
                looping: false,
                target_play: TargetDef::with_link(0),
                ..SoundDef::default()
            })],
            ..SynthesizerDesc::default()
        }))
    };

    let synthesizer = build_synth();
    let instance = instance_for(&synthesizer);
    instance.set_controller(0, constant_controller(1.0));

    let first = to_i16(&produce(&instance, 0, 80));
    assert!(first[..39].iter().all(|&s| (s - 8000).abs() <= 1));
    assert!(first[39..].iter().all(|&s| s == 0));

    // play still high: stays stopped
    let second = to_i16(&produce(&instance, 80, 40));
    assert!(second.iter().all(|&s| s == 0));

    // dip below pause resets the position
    instance.set_controller(0, constant_controller(0.0));
    produce(&instance, 120, 10);
    instance.set_controller(0, constant_controller(1.0));
    let third = to_i16(&produce(&instance, 130, 40));
    assert!(third[..39].iter().all(|&s| (s - 8000).abs() <= 1));
}

// =============================================================================
// Chain sources
// =============================================================================

/// The chain picks one sound per trigger: the select target is read at
/// the idle-to-playing transition, the sound plays through once, and a
/// retrigger requires the play value to fall below the pause threshold.
#[test]
fn test_chain_plays_selected_sound_once() {
    let synthesizer = Arc::new(Synthesizer::with_desc(SynthesizerDesc {
        controllers: vec![ControllerDef::default(), ControllerDef::default()],
        links: vec![identity_link(0), identity_link(1)],
        sources: vec![SourceDef::Chain(ChainDef {
            sounds: vec![
                mono16_asset("a", vec![1000; 50]),
                mono16_asset("b", vec![2000; 50]),
                mono16_asset("c", vec![3000; 50]),
            ],
            target_select: TargetDef::with_link(0),
            target_play: TargetDef::with_link(1),
            ..ChainDef::default()
        })],
        ..SynthesizerDesc::default()
    }));

    let instance = instance_for(&synthesizer);
    instance.set_controller(0, constant_controller(0.5));
    instance.set_controller(1, constant_controller(1.0));

    // select 0.5 maps into the middle of three sounds; the final sample
    // position ends the sound without sounding
    let first = to_i16(&produce(&instance, 0, 100));
    assert!(first[..49].iter().all(|&s| (s - 2000).abs() <= 1), "{first:?}");
    assert!(first[49..].iter().all(|&s| s == 0));

    // play held high: no retrigger
    let second = to_i16(&produce(&instance, 100, 100));
    assert!(second.iter().all(|&s| s == 0));

    // dip below pause re-arms, rising above play retriggers
    instance.set_controller(1, constant_controller(0.0));
    produce(&instance, 200, 10);
    instance.set_controller(1, constant_controller(1.0));
    let third = to_i16(&produce(&instance, 210, 60));
    assert!(third[..49].iter().all(|&s| (s - 2000).abs() <= 1));
}

// =============================================================================
// Group sources
// =============================================================================

/// Select blends between the two straddling children: a ramped select
/// crossfades 440 Hz into 660 Hz.
#[test]
fn test_group_select_crossfades() {
    let samples = 4410;
    let synthesizer = Arc::new(Synthesizer::with_desc(SynthesizerDesc {
        controllers: vec![ControllerDef::default()],
        links: vec![identity_link(0)],
        sources: vec![SourceDef::Group(GroupDef {
            application: GroupApplication::Select,
            sources: vec![wave(440.0), wave(660.0)],
            target_select: TargetDef::with_link(0),
            ..GroupDef::default()
        })],
        ..SynthesizerDesc::default()
    }));
    let instance = instance_for(&synthesizer);
    instance.set_controller(
        0,
        ControllerDef {
            curve: CurveBezier::from_points(CurveInterpolation::Linear, &[(0.0, 0.0), (0.1, 1.0)]),
            ..ControllerDef::default()
        },
    );

    let rendered = to_i16(&produce(&instance, 0, samples));
    for i in (0..samples).step_by(7) {
        let t = i as f64 / 44100.0;
        let blend = (t / 0.1).min(1.0);
        let a = (TAU * 440.0 * t).sin();
        let b = (TAU * 660.0 * t).sin();
        let ideal = ((1.0 - blend) * a + blend * b) * 32767.0;
        assert!(
            (rendered[i] as f64 - ideal).abs() <= 192.0,
            "sample {i}: {} vs {ideal:.0}",
            rendered[i]
        );
    }
}

/// Children outside the current selection advance through the skip path:
/// when the selection lands on them later, their phase matches a child
/// that had been generated all along.
#[test]
fn test_group_select_keeps_skipped_children_in_phase() {
    let synthesizer = Arc::new(Synthesizer::with_desc(SynthesizerDesc {
        controllers: vec![ControllerDef::default()],
        links: vec![identity_link(0)],
        sources: vec![SourceDef::Group(GroupDef {
            application: GroupApplication::Select,
            sources: vec![wave(440.0), wave(660.0), wave(880.0)],
            target_select: TargetDef::with_link(0),
            ..GroupDef::default()
        })],
        ..SynthesizerDesc::default()
    }));
    let instance = instance_for(&synthesizer);

    // child 2 is never touched while select sits at 0
    instance.set_controller(0, constant_controller(0.0));
    produce(&instance, 0, 1000);

    // select jumps to the last child
    instance.set_controller(0, constant_controller(1.0));
    let group_bytes = produce(&instance, 1000, 500);

    // a standalone 880 Hz voice generated continuously
    let reference = instance_for(&mono16(vec![wave(880.0)]));
    produce(&reference, 0, 1000);
    let reference_bytes = produce(&reference, 1000, 500);

    assert_eq!(group_bytes, reference_bytes);
}

/// Solo picks the nearest child only.
#[test]
fn test_group_solo_picks_nearest_child() {
    let build = |select: f32| {
        let synthesizer = Arc::new(Synthesizer::with_desc(SynthesizerDesc {
            controllers: vec![ControllerDef::default()],
            links: vec![identity_link(0)],
            sources: vec![SourceDef::Group(GroupDef {
                application: GroupApplication::Solo,
                sources: vec![wave(440.0), wave(660.0)],
                target_select: TargetDef::with_link(0),
                ..GroupDef::default()
            })],
            ..SynthesizerDesc::default()
        }));
        let instance = instance_for(&synthesizer);
        instance.set_controller(0, constant_controller(select));
        produce(&instance, 0, 800)
    };

    let low = build(0.1);
    let high = build(0.9);
    let reference_low = produce(&instance_for(&mono16(vec![wave(440.0)])), 0, 800);
    let reference_high = produce(&instance_for(&mono16(vec![wave(660.0)])), 0, 800);
    assert_eq!(low, reference_low);
    assert_eq!(high, reference_high);
}

// =============================================================================
// Sub-synthesizers
// =============================================================================

/// Child links are remapped through the connection table: a parent
/// controller drives the child's frequency link.
#[test]
fn test_subsynth_remaps_controllers_into_parent() {
    let child = Arc::new(Synthesizer::with_desc(SynthesizerDesc {
        controllers: vec![ControllerDef::default()],
        links: vec![identity_link(0)],
        sources: vec![SourceDef::Wave(WaveDef {
            min_frequency: 200.0,
            max_frequency: 600.0,
            target_frequency: TargetDef::with_link(0),
            ..WaveDef::default()
        })],
        ..SynthesizerDesc::default()
    }));

    let parent = Arc::new(Synthesizer::with_desc(SynthesizerDesc {
        controllers: vec![ControllerDef::default()],
        sources: vec![SourceDef::SubSynth(SubSynthDef {
            synthesizer: Some(child),
            connections: vec![0],
            ..SubSynthDef::default()
        })],
        ..SynthesizerDesc::default()
    }));
    let instance = instance_for(&parent);
    instance.set_controller(0, constant_controller(0.5));

    // 200 + 0.5 * 400 = a 400 Hz voice
    let rendered = produce(&instance, 0, 1500);
    let reference = produce(&instance_for(&mono16(vec![wave(400.0)])), 0, 1500);
    assert_eq!(rendered, reference);
}

/// An unmapped connection leaves the child target at its default.
#[test]
fn test_subsynth_without_connection_uses_defaults() {
    let child = Arc::new(Synthesizer::with_desc(SynthesizerDesc {
        controllers: vec![ControllerDef::default()],
        links: vec![identity_link(0)],
        sources: vec![SourceDef::Wave(WaveDef {
            min_frequency: 200.0,
            max_frequency: 600.0,
            target_frequency: TargetDef::with_link(0),
            ..WaveDef::default()
        })],
        ..SynthesizerDesc::default()
    }));

    let parent = Arc::new(Synthesizer::with_desc(SynthesizerDesc {
        sources: vec![SourceDef::SubSynth(SubSynthDef {
            synthesizer: Some(child),
            connections: vec![-1],
            ..SubSynthDef::default()
        })],
        ..SynthesizerDesc::default()
    }));

    // inert link: frequency target falls back to 0, so min_frequency
    let rendered = produce(&instance_for(&parent), 0, 1500);
    let reference = produce(&instance_for(&mono16(vec![wave(200.0)])), 0, 1500);
    assert_eq!(rendered, reference);
}

// =============================================================================
// Stretch effect
// =============================================================================

/// With time and pitch pinned to zero the stretch chain is an exact
/// bypass.
#[test]
fn test_stretch_at_zero_is_bypass() {
    let stretched = SourceDef::Wave(WaveDef {
        common: SourceCommonDef {
            effects: vec![EffectDef::Stretch(StretchDef::default())],
            ..SourceCommonDef::default()
        },
        ..WaveDef::default()
    });

    let with_effect = produce(&instance_for(&mono16(vec![stretched])), 0, 44100);
    let without = produce(&instance_for(&mono16(vec![wave(440.0)])), 0, 44100);
    assert_eq!(with_effect, without);
}

/// A pitched-up stretch still delivers a full, audible buffer.
#[test]
fn test_stretch_with_pitch_shift_produces_audio() {
    let stretched = SourceDef::Wave(WaveDef {
        common: SourceCommonDef {
            effects: vec![EffectDef::Stretch(StretchDef {
                min_pitch: 1.0,
                max_pitch: 1.0,
                ..StretchDef::default()
            })],
            ..SourceCommonDef::default()
        },
        ..WaveDef::default()
    });

    let instance = instance_for(&mono16(vec![stretched]));
    let samples = to_i16(&produce(&instance, 0, 8192));
    let tail = &samples[4096..];
    let peak = tail.iter().map(|&s| (s as i32).abs()).max().unwrap();
    assert!(peak > 8000, "peak {peak}");
}

/// The stretch state survives across calls and keeps the pool balanced.
#[test]
fn test_stretch_state_survives_across_calls() {
    let pool = SharedBufferPool::new();
    let stretched = SourceDef::Wave(WaveDef {
        common: SourceCommonDef {
            effects: vec![EffectDef::Stretch(StretchDef {
                min_time: 0.5,
                max_time: 0.5,
                ..StretchDef::default()
            })],
            ..SourceCommonDef::default()
        },
        ..WaveDef::default()
    });
    let instance =
        SynthesizerInstance::with_synthesizer(pool.clone(), mono16(vec![stretched]));

    produce(&instance, 0, 2048);
    produce(&instance, 2048, 2048);
    assert_eq!(pool.in_use(), 0);
}
