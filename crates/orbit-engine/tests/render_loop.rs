use orbit_engine::device::{Extent, HeadlessBackend, RenderBackend};
use orbit_engine::render::screen::{self, ScreenConfig, ScreenState};
use orbit_engine::{Error, LoopConfig, RenderLoop};

const DT: f32 = 1.0 / 60.0;

fn small() -> LoopConfig {
    LoopConfig {
        grid_size: 8,
        ring_shapes: 8,
        circle_resolution: 12,
        ..LoopConfig::default()
    }
}

#[test]
fn capture_cycle_after_resize_is_complete() {
    let mut backend = HeadlessBackend::new(Extent::new(800, 600));
    let mut s = screen::select(&mut backend, ScreenConfig::default()).unwrap();
    assert_eq!(s.samples(), 4);

    s.resize(&mut backend, Extent::new(800, 600)).unwrap();
    assert_eq!(s.resolve_size(), Some(Extent::new(800, 600)));

    s.begin_capture(&mut backend);
    s.end_capture_and_composite(&mut backend);
    assert_eq!(s.state(), ScreenState::Resolved);

    s.dispose(&mut backend);
    assert_eq!(backend.live_resources(), 0);
}

#[test]
fn empty_capture_composites_the_clear_color() {
    let clear = [0.2, 0.4, 0.6, 1.0];
    let mut backend = HeadlessBackend::new(Extent::new(6, 4));
    let mut s = screen::select(
        &mut backend,
        ScreenConfig {
            clear_color: clear,
            ..ScreenConfig::default()
        },
    )
    .unwrap();
    s.resize(&mut backend, Extent::new(6, 4)).unwrap();

    s.begin_capture(&mut backend);
    s.end_capture_and_composite(&mut backend);

    for px in backend.surface_pixels() {
        for (got, want) in px.iter().zip(clear) {
            assert!((got - want).abs() < 1e-5, "{px:?} != {clear:?}");
        }
    }
}

#[test]
fn single_sample_devices_get_the_direct_screen() {
    let mut backend = HeadlessBackend::new(Extent::new(16, 16)).with_max_samples(1);
    let mut lp = RenderLoop::new(&mut backend, small()).unwrap();
    assert_eq!(lp.screen().samples(), 1);

    lp.tick(&mut backend, DT).unwrap();
    assert_eq!(lp.screen().state(), ScreenState::Resolved);
    assert_eq!(backend.frames_completed(), 1);
}

#[test]
fn failed_target_allocation_stops_rendering() {
    let mut backend = HeadlessBackend::new(Extent::new(16, 16));
    let mut lp = RenderLoop::new(&mut backend, small()).unwrap();

    backend.set_fail_allocations(true);
    let err = lp.tick(&mut backend, DT).unwrap_err();
    assert!(matches!(err, Error::GpuResource(_)));
    assert_eq!(lp.screen().state(), ScreenState::Failed);

    backend.set_fail_allocations(false);
    lp.tick(&mut backend, DT).unwrap();
    assert_eq!(backend.frames_completed(), 0);
}

#[test]
fn particle_buffer_grows_past_initial_capacity() {
    let mut backend = HeadlessBackend::new(Extent::new(16, 16));
    let config = LoopConfig {
        initial_capacity: 16,
        ..small()
    };
    let mut lp = RenderLoop::new(&mut backend, config).unwrap();
    assert_eq!(lp.particles().unwrap().buffer_capacity(), 16);

    lp.tick(&mut backend, DT).unwrap();
    let set = lp.particles().unwrap();
    assert_eq!(set.pool().len(), 64);
    assert!(set.buffer_capacity() >= 64);

    let particle_draw = backend
        .draws()
        .iter()
        .find(|d| d.program == "particles")
        .unwrap();
    assert_eq!(particle_draw.instances, 0..64);
    assert!(particle_draw.in_bounds);
}

#[test]
fn blur_toggle_reaches_the_composite() {
    let mut backend = HeadlessBackend::new(Extent::new(16, 16));
    let mut lp = RenderLoop::new(&mut backend, small()).unwrap();

    lp.tick(&mut backend, DT).unwrap();
    let last = backend.take_draws().pop().unwrap();
    assert_eq!(last.program, "screen");
    assert_eq!(&last.uniforms[0..4], &0i32.to_ne_bytes());

    assert!(lp.toggle_blur());
    lp.tick(&mut backend, DT).unwrap();
    let last = backend.take_draws().pop().unwrap();
    assert_eq!(last.program, "screen");
    assert_eq!(&last.uniforms[0..4], &1i32.to_ne_bytes());
}

#[test]
fn full_grid_stays_finite_over_ten_ticks() {
    let mut backend = HeadlessBackend::new(Extent::new(64, 48));
    let mut lp = RenderLoop::new(&mut backend, LoopConfig::default()).unwrap();

    for _ in 0..10 {
        lp.tick(&mut backend, DT).unwrap();
    }
    assert_eq!(backend.frames_completed(), 10);

    let snap = lp.particles().unwrap().pool().snapshot();
    assert_eq!(snap.positions.len(), 1024);
    assert!(
        snap.positions
            .iter()
            .chain(snap.velocities)
            .flatten()
            .all(|v| v.is_finite())
    );
}

#[test]
fn reset_reseeds_without_leaking() {
    let mut backend = HeadlessBackend::new(Extent::new(16, 16));
    let mut lp = RenderLoop::new(&mut backend, small()).unwrap();
    lp.tick(&mut backend, DT).unwrap();
    let live = backend.live_resources();
    let drawables = lp.scene().len();

    lp.reset_particles(&mut backend).unwrap();
    assert_eq!(backend.live_resources(), live);
    assert_eq!(lp.scene().len(), drawables);

    let snap = lp.particles().unwrap().pool().snapshot();
    assert!(snap.velocities.iter().all(|v| *v == [0.0, 0.0]));
    assert_eq!(snap.positions[0], [-0.5, -0.5]);

    lp.dispose(&mut backend);
    assert_eq!(backend.live_resources(), 0);
    assert_eq!(backend.surface_size(), Extent::new(16, 16));
}
