// Copyright 2025 the Stipple Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! End-to-end scenarios driving both stages over fabricated scenes.

use peniko::color::palette::css;
use peniko::Color;
use stipple_encoding::ptcl::{CMD_END, PTCL_INITIAL_ALLOC};
use stipple_encoding::DrawColor;
use stipple_tests::decode::Command;
use stipple_tests::reference::{channel_distance, composite_over};
use stipple_tests::TestScene;

const RED: Color = css::RED;

#[test]
fn empty_scene() {
    let frame = TestScene::new(64, 64).resolve();
    frame.render().unwrap();
    let ptcl = frame.ptcl_words();
    for tile_y in 0..4 {
        for tile_x in 0..4 {
            let decoded = frame.decode_tile(tile_x, tile_y);
            assert!(decoded.commands.is_empty());
            assert!(decoded.jumps.is_empty());
            assert_eq!(
                ptcl[frame.initial_offset(tile_x, tile_y) as usize],
                CMD_END
            );
        }
    }
    assert!(frame.output_pixels().iter().all(|&p| p == 0));
    assert_eq!(frame.bump().ptcl, 0);
    assert_eq!(frame.bump().failed, 0);
}

#[test]
fn solid_red_rect() {
    // The rect covers both tiles of a 32x16 target. Its left edge puts
    // segments in tile 0; tile 1 sees only the carried backdrop, which
    // is the solid fast path.
    let mut scene = TestScene::new(32, 16);
    scene.fill_rect(0.0, 0.0, 32.0, 16.0, RED);
    let frame = scene.resolve();
    frame.render().unwrap();

    let right = frame.decode_tile(1, 0);
    assert_eq!(
        right.commands,
        vec![Command::Solid, Command::Color { rgba: 0xff00_00ff }]
    );
    let left = frame.decode_tile(0, 0);
    assert!(matches!(
        left.commands[0],
        Command::Fill {
            backdrop: 0,
            segments
        } if segments != 0
    ));
    assert_eq!(left.commands[1], Command::Color { rgba: 0xff00_00ff });

    for y in 0..16 {
        for x in 16..32 {
            assert_eq!(frame.pixel(x, y), 0xff00_00ff);
        }
    }
    for y in 0..16 {
        for x in 0..16 {
            assert!(channel_distance(frame.pixel(x, y), 0xff00_00ff) <= 1);
        }
    }
}

#[test]
fn diagonal_stroke_antialiasing() {
    let mut scene = TestScene::new(32, 32);
    scene.stroke_polyline(&[[0.0, 0.0], [32.0, 32.0]], 1.0, Color::WHITE);
    let frame = scene.resolve();
    frame.render().unwrap();

    let decoded = frame.decode_tile(0, 0);
    assert!(matches!(
        decoded.commands[0],
        Command::Stroke { half_width, .. } if half_width == 0.5
    ));

    // Pixel centers on the line get full coverage.
    for i in 0..32 {
        let alpha = frame.pixel(i, i) >> 24;
        assert!(alpha >= 250, "alpha {alpha} at ({i}, {i})");
    }
    // Off-diagonal neighbors sit 1/sqrt(2) away from the spine.
    for i in 1..31 {
        let alpha = (frame.pixel(i, i - 1) >> 24) as f32 / 255.0;
        assert!(
            (0.2..0.4).contains(&alpha),
            "alpha {alpha} at ({i}, {})",
            i - 1
        );
    }
    // Far from the line: nothing.
    assert_eq!(frame.pixel(24, 8), 0);
    assert_eq!(frame.pixel(8, 24), 0);
}

#[test]
fn draw_order_composites_a_then_b() {
    let red_half = DrawColor::from(Color::new([1.0, 0.0, 0.0, 0.5]));
    let blue_half = DrawColor::from(Color::new([0.0, 0.0, 1.0, 0.5]));
    let mut scene = TestScene::new(32, 32);
    scene.fill_rect(8.0, 8.0, 24.0, 24.0, red_half);
    scene.fill_rect(12.0, 12.0, 28.0, 28.0, blue_half);
    let frame = scene.resolve();
    frame.render().unwrap();

    // The overlap tile composites red then blue, regardless of how the
    // two rects were binned.
    let decoded = frame.decode_tile(1, 1);
    assert_eq!(decoded.colors(), vec![red_half.rgba, blue_half.rgba]);

    let expected = composite_over(&[(red_half.rgba, 1.0), (blue_half.rgba, 1.0)]);
    assert!(channel_distance(frame.pixel(18, 18), expected) <= 1);
    // A pixel only under the first rect.
    let expected_a = composite_over(&[(red_half.rgba, 1.0)]);
    assert!(channel_distance(frame.pixel(10, 10), expected_a) <= 1);
}

#[test]
fn ptcl_overflow_follows_jump_chain() {
    let colors: Vec<DrawColor> = (0..300)
        .map(|i| {
            DrawColor::from(Color::new([
                (i % 5) as f32 * 0.25,
                ((i / 5) % 5) as f32 * 0.25,
                0.5,
                0.3,
            ]))
        })
        .collect();
    let mut scene = TestScene::new(16, 16);
    for color in &colors {
        scene.fill_rect(4.0, 4.0, 12.0, 12.0, *color);
    }
    let frame = scene.resolve();
    frame.render().unwrap();

    let decoded = frame.decode_tile(0, 0);
    assert_eq!(decoded.commands.len(), 600);
    assert!(!decoded.jumps.is_empty());
    let static_end = PTCL_INITIAL_ALLOC;
    for &target in &decoded.jumps {
        assert!(target >= static_end);
    }
    assert_eq!(
        decoded.colors(),
        colors.iter().map(|c| c.rgba).collect::<Vec<_>>()
    );

    // The composited interior matches a scalar reference fed the same
    // draw list.
    let draws: Vec<(u32, f32)> = colors.iter().map(|c| (c.rgba, 1.0)).collect();
    let expected = composite_over(&draws);
    assert!(channel_distance(frame.pixel(8, 8), expected) <= 2);
}

#[test]
fn bin_boundary_straddle() {
    // 17 tiles wide: tiles 0..16 are in bin 0, tile 16 in bin 1. The
    // rect spans the boundary between tiles 15 and 16.
    let mut scene = TestScene::new(272, 16);
    scene.fill_rect(248.0, 0.0, 264.0, 16.0, RED);
    let frame = scene.resolve();
    frame.render().unwrap();

    let left = frame.decode_tile(15, 0);
    let right = frame.decode_tile(16, 0);
    let Command::Fill {
        segments: left_head,
        backdrop: left_backdrop,
    } = left.commands[0]
    else {
        panic!("expected fill in tile 15, got {:?}", left.commands[0]);
    };
    let Command::Fill {
        segments: right_head,
        backdrop: right_backdrop,
    } = right.commands[0]
    else {
        panic!("expected fill in tile 16, got {:?}", right.commands[0]);
    };
    assert_eq!(left_backdrop, 0);
    assert_eq!(right_backdrop, 1);

    // The two tiles' segment lists are disjoint.
    let segments = frame.segments();
    let chain = |head: u32| {
        let mut out = std::collections::HashSet::new();
        let mut ix = head;
        while ix != 0 {
            out.insert(ix);
            ix = segments[ix as usize].next;
        }
        out
    };
    let left_chain = chain(left_head);
    let right_chain = chain(right_head);
    assert!(!left_chain.is_empty());
    assert!(!right_chain.is_empty());
    assert!(left_chain.is_disjoint(&right_chain));

    // Uniform color across the straddled interior, nothing outside.
    for x in 249..263 {
        for y in 0..16 {
            assert!(channel_distance(frame.pixel(x, y), 0xff00_00ff) <= 1);
        }
    }
    for y in 0..16 {
        assert_eq!(frame.pixel(240, y), 0);
        assert_eq!(frame.pixel(268, y), 0);
    }
}
