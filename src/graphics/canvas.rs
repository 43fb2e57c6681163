use tiny_skia::{
    Color, FillRule, GradientStop, LineCap, LinearGradient, Paint, PathBuilder, Pixmap, Point,
    Rect, Shader, SpreadMode, Stroke, Transform,
};

use super::Rgb;

pub fn solid(color: Color) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(color);
    paint.anti_alias = true;
    paint
}

pub fn clear(pixmap: &mut Pixmap, color: Rgb) {
    pixmap.fill(color.opaque());
}

/// Paints a translucent layer of `color` over everything; repeated per frame it leaves trails.
pub fn fade(pixmap: &mut Pixmap, color: Rgb, alpha: f32) {
    let (w, h) = (pixmap.width() as f32, pixmap.height() as f32);
    fill_rect(pixmap, 0.0, 0.0, w, h, &solid(color.with_alpha(alpha)));
}

pub fn fill_rect(pixmap: &mut Pixmap, x: f32, y: f32, w: f32, h: f32, paint: &Paint) {
    if let Some(rect) = Rect::from_xywh(x, y, w.max(0.0), h.max(0.0)) {
        pixmap.fill_rect(rect, paint, Transform::identity(), None);
    }
}

/// Vertical gradient from `top` at `y0` to `bottom` at `y1`.
pub fn vertical_gradient(top: Color, bottom: Color, x: f32, y0: f32, y1: f32) -> Option<Shader<'static>> {
    LinearGradient::new(
        Point::from_xy(x, y0),
        Point::from_xy(x, y1),
        vec![GradientStop::new(0.0, top), GradientStop::new(1.0, bottom)],
        SpreadMode::Pad,
        Transform::identity(),
    )
}

pub fn fill_circle(pixmap: &mut Pixmap, cx: f32, cy: f32, radius: f32, paint: &Paint) {
    if radius <= 0.0 {
        return;
    }
    if let Some(path) = PathBuilder::from_circle(cx, cy, radius) {
        pixmap.fill_path(&path, paint, FillRule::Winding, Transform::identity(), None);
    }
}

pub fn line(pixmap: &mut Pixmap, from: (f32, f32), to: (f32, f32), paint: &Paint, width: f32) {
    let mut pb = PathBuilder::new();
    pb.move_to(from.0, from.1);
    pb.line_to(to.0, to.1);
    if let Some(path) = pb.finish() {
        pixmap.stroke_path(&path, paint, &stroke(width), Transform::identity(), None);
    }
}

/// Strokes connected points; `closed` joins the last point back to the first.
pub fn polyline(pixmap: &mut Pixmap, points: &[(f32, f32)], paint: &Paint, width: f32, closed: bool) {
    let Some(path) = build_path(points, closed) else {
        return;
    };
    pixmap.stroke_path(&path, paint, &stroke(width), Transform::identity(), None);
}

pub fn fill_polygon(pixmap: &mut Pixmap, points: &[(f32, f32)], paint: &Paint) {
    if let Some(path) = build_path(points, true) {
        pixmap.fill_path(&path, paint, FillRule::Winding, Transform::identity(), None);
    }
}

fn build_path(points: &[(f32, f32)], closed: bool) -> Option<tiny_skia::Path> {
    let (first, rest) = points.split_first()?;
    if rest.is_empty() {
        return None;
    }
    let mut pb = PathBuilder::new();
    pb.move_to(first.0, first.1);
    for p in rest {
        pb.line_to(p.0, p.1);
    }
    if closed {
        pb.close();
    }
    pb.finish()
}

fn stroke(width: f32) -> Stroke {
    Stroke {
        width: width.max(0.5),
        line_cap: LineCap::Round,
        ..Stroke::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel(pixmap: &Pixmap, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * pixmap.width() + x) * 4) as usize;
        let d = pixmap.data();
        [d[i], d[i + 1], d[i + 2], d[i + 3]]
    }

    #[test]
    fn test_rect_and_circle_paint_pixels() {
        let mut pixmap = Pixmap::new(20, 20).unwrap();
        clear(&mut pixmap, Rgb::BLACK);
        fill_rect(&mut pixmap, 0.0, 0.0, 5.0, 5.0, &solid(Rgb::WHITE.opaque()));
        fill_circle(&mut pixmap, 15.0, 15.0, 3.0, &solid(Color::from_rgba8(255, 0, 0, 255)));

        assert_eq!(pixel(&pixmap, 2, 2), [255, 255, 255, 255]);
        assert_eq!(pixel(&pixmap, 15, 15), [255, 0, 0, 255]);
        assert_eq!(pixel(&pixmap, 10, 2), [0, 0, 0, 255]);
    }

    #[test]
    fn test_degenerate_shapes_are_ignored() {
        let mut pixmap = Pixmap::new(4, 4).unwrap();
        polyline(&mut pixmap, &[(1.0, 1.0)], &solid(Rgb::WHITE.opaque()), 1.0, false);
        fill_circle(&mut pixmap, 2.0, 2.0, 0.0, &solid(Rgb::WHITE.opaque()));
        fill_rect(&mut pixmap, 0.0, 0.0, 0.0, 3.0, &solid(Rgb::WHITE.opaque()));
        assert!(pixmap.data().iter().all(|&b| b == 0));
    }
}
