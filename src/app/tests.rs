use super::*;
use crate::camera::{CameraControl, Parameter, ParameterSetting};
use crate::config::{CamrelayConfig, RunMode};
use crate::frame::FrameGeometry;
use crate::lifecycle::{LoopEnd, LoopReport, LoopRole, StopSignal};
use std::path::Path;
use std::thread;
use std::time::Duration;

fn create_test_config(output_dir: &Path) -> CamrelayConfig {
    let mut config = CamrelayConfig::default();
    config.camera.width = 4;
    config.camera.height = 2;
    config.capture.run_seconds = 1;
    config.capture.retry_interval_ms = 0;
    config.relay.frame_count = 2;
    config.relay.interval_ms = 1;
    config.relay.poll_interval_ms = 1;
    config.present.idle_interval_ms = 1;
    config.present.keyboard = false;
    config.present.output_dir = output_dir.to_string_lossy().to_string();
    config.system.mode = RunMode::Thread;
    config
}

fn report(role: LoopRole, ended_by: LoopEnd) -> LoopReport {
    LoopReport {
        role,
        ended_by,
        elapsed: Duration::ZERO,
        frames: 0,
        secondary: 0,
    }
}

fn wait_for_exit(group: &mut ChildGroup) {
    for _ in 0..500 {
        group.reap().unwrap();
        if group.all_exited() {
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("children did not exit in time");
}

#[test]
fn test_prepare_applies_overrides_and_allocates() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(dir.path());
    config
        .camera
        .parameters
        .insert(Parameter::Focus, ParameterSetting::Value(250.0));
    // Out of range: logged and skipped
    config
        .camera
        .parameters
        .insert(Parameter::Gain, ParameterSetting::Value(500.0));

    let prepared = prepare(&config).unwrap();

    assert_eq!(
        prepared.camera.get_parameter(Parameter::Focus).unwrap().now,
        250.0
    );
    assert_eq!(prepared.camera.get_parameter(Parameter::Gain).unwrap().now, 0.0);
    assert_eq!(prepared.exchange.geometry(), FrameGeometry::rgb(2, 4));
}

#[test]
fn test_build_input_without_keyboard() {
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(dir.path());

    let input = build_input(&config.present, StopSignal::Never);
    assert_eq!(input.len(), 1);
}

#[test]
fn test_exit_code() {
    let clean = vec![
        report(LoopRole::Capture, LoopEnd::Deadline),
        report(LoopRole::Relay, LoopEnd::FrameCount),
        report(LoopRole::Present, LoopEnd::Stopped),
    ];
    assert_eq!(exit_code(&clean), 0);

    let mut failed = clean.clone();
    failed.push(report(
        LoopRole::Capture,
        LoopEnd::Failed("device gone".to_string()),
    ));
    assert_eq!(exit_code(&failed), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_thread_mode_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(dir.path());

    let reports = Supervisor::new(config).run_threads().await.unwrap();

    assert_eq!(exit_code(&reports), 0);
    assert_eq!(reports[0].role, LoopRole::Capture);
    assert_eq!(reports[0].ended_by, LoopEnd::Deadline);
    assert!(reports[0].frames > 0);
    assert_eq!(reports[1].ended_by, LoopEnd::FrameCount);
    assert_eq!(reports[1].frames, 2);
    assert_eq!(reports[2].ended_by, LoopEnd::Stopped);

    // The blank initial display plus one file per relayed frame
    let files = saved_files(dir.path());
    assert_eq!(files.len(), 3);
    assert_eq!(reports[2].secondary, 3);
    assert!(files[0].ends_with("save_0000.png"));

    let is_blank = |p: &image::Rgb<u8>| p.0 == [0, 0, 0];
    let is_pattern = |p: &image::Rgb<u8>| p.0[1] == 128 && p.0[0] as u16 + p.0[2] as u16 == 255;

    for path in &files {
        let decoded = image::open(path).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (4, 2));
        let pixel = decoded.get_pixel(3, 1);
        assert!(is_blank(pixel) || is_pattern(pixel), "{:?}", path);
    }

    let last = image::open(&files[2]).unwrap().to_rgb8();
    assert!(is_pattern(last.get_pixel(0, 0)));
}

fn saved_files(dir: &Path) -> Vec<std::path::PathBuf> {
    let mut files: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    files.sort();
    files
}

// Supervisor::run builds its own runtime after forking, so no tokio test here
#[test]
fn test_process_mode_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(dir.path());
    config.system.mode = RunMode::Process;

    let code = Supervisor::new(config).run().unwrap();
    assert_eq!(code, 0);

    // Written by the forked presenter into the shared output directory
    let files = saved_files(dir.path());
    assert_eq!(files.len(), 3, "{:?}", files);
    assert!(files[0].ends_with("save_0000.png"));

    let first = image::open(&files[0]).unwrap().to_rgb8();
    assert_eq!(first.get_pixel(0, 0).0, [0, 0, 0]);

    let last = image::open(&files[2]).unwrap().to_rgb8();
    assert_eq!(last.dimensions(), (4, 2));
    let pixel = last.get_pixel(0, 0);
    assert_eq!(pixel.0[1], 128);
    assert_eq!(pixel.0[0] as u16 + pixel.0[2] as u16, 255);
}

#[test]
fn test_child_group_collects_exit_status() {
    let mut group = ChildGroup::new();
    group
        .spawn(LoopRole::Capture, || report(LoopRole::Capture, LoopEnd::Deadline))
        .unwrap();
    group
        .spawn(LoopRole::Relay, || {
            report(LoopRole::Relay, LoopEnd::Failed("scripted".to_string()))
        })
        .unwrap();

    wait_for_exit(&mut group);

    let children = group.children();
    assert_eq!(children[0].role(), LoopRole::Capture);
    assert!(children[0].exit_status().unwrap().success());
    assert_eq!(children[1].exit_status().unwrap().code(), Some(1));
    assert_eq!(group.exit_code(), 1);
}

#[test]
fn test_child_stops_on_termination_request() {
    let mut group = ChildGroup::new();
    group
        .spawn(LoopRole::Present, || {
            let stop = StopSignal::Termination;
            while !stop.is_stopped() {
                thread::sleep(Duration::from_millis(1));
            }
            report(LoopRole::Present, LoopEnd::Stopped)
        })
        .unwrap();

    thread::sleep(Duration::from_millis(50));
    assert!(group.is_running(LoopRole::Present));

    group.stop(LoopRole::Present);
    wait_for_exit(&mut group);

    assert_eq!(group.exit_code(), 0);
}
