use ab_glyph::{point, Font, FontVec, Glyph, GlyphId, PxScale, ScaleFont};
use anyhow::{anyhow, Context, Result};
use sct_cache::{intern_label, label_text};
use sct_core::{CueKind, Direction, Feedback, Stimulus, VisualState};
use std::collections::HashMap;
use std::sync::Arc;
use tiny_skia::{
    Color, FillRule, Paint, PathBuilder, Pixmap, PixmapPaint, Rect, Stroke, Transform,
};

const WHITE: [u8; 4] = [255, 255, 255, 255];
const LIME: [u8; 4] = [50, 205, 50, 255];
const RED: [u8; 4] = [220, 40, 40, 255];
const GRAY: [u8; 4] = [160, 160, 160, 255];

const MESSAGE_PX: f32 = 28.0;
const LABEL_PX: f32 = 34.0;

/// Rendered-text pixmaps keyed by interned label id and color, so the
/// same string is laid out at most once per color.
struct TextCache {
    font: Arc<FontVec>,
    size_px: f32,
    map: HashMap<(usize, [u8; 4]), Arc<Pixmap>>,
}

impl TextCache {
    fn new(font: Arc<FontVec>, size_px: f32) -> Self {
        Self {
            font,
            size_px,
            map: HashMap::new(),
        }
    }

    fn get_or_render(&mut self, label_id: usize, color: [u8; 4]) -> Arc<Pixmap> {
        if let Some(p) = self.map.get(&(label_id, color)) {
            return Arc::clone(p);
        }
        let pm = Arc::new(render_text_pixmap(
            &label_text(label_id),
            self.size_px,
            &self.font,
            color,
        ));
        self.map.insert((label_id, color), Arc::clone(&pm));
        pm
    }
}

/// Lays a single line of text out into a premultiplied pixmap.
pub fn render_text_pixmap(text: &str, font_size: f32, font: &FontVec, color: [u8; 4]) -> Pixmap {
    let scale = PxScale::from(font_size);
    let sf = font.as_scaled(scale);

    let mut pen_x = 0.0f32;
    let mut glyphs = Vec::<Glyph>::new();
    let mut last: Option<GlyphId> = None;
    for ch in text.chars() {
        let id = sf.glyph_id(ch);
        if let Some(prev) = last {
            pen_x += sf.kern(prev, id);
        }
        glyphs.push(id.with_scale_and_position(scale, point(pen_x, sf.ascent())));
        pen_x += sf.h_advance(id);
        last = Some(id);
    }

    let width = pen_x.ceil().max(1.0) as u32;
    let height = sf.height().ceil().max(1.0) as u32;
    let mut pixmap = match Pixmap::new(width, height) {
        Some(p) => p,
        None => return Pixmap::new(1, 1).expect("1x1 pixmap"),
    };

    let [r, g, b, _] = color;
    for glyph in glyphs {
        if let Some(outlined) = sf.outline_glyph(glyph) {
            let bounds = outlined.px_bounds();
            let data = pixmap.data_mut();
            outlined.draw(|x, y, coverage| {
                let px = bounds.min.x as i32 + x as i32;
                let py = bounds.min.y as i32 + y as i32;
                if px < 0 || py < 0 || px as u32 >= width || py as u32 >= height {
                    return;
                }
                let idx = (py as u32 * width + px as u32) as usize * 4;
                let a = (coverage.clamp(0.0, 1.0) * 255.0) as u8;
                if a > data[idx + 3] {
                    // Premultiplied RGBA, matching the canvas format.
                    data[idx] = (r as f32 * coverage) as u8;
                    data[idx + 1] = (g as f32 * coverage) as u8;
                    data[idx + 2] = (b as f32 * coverage) as u8;
                    data[idx + 3] = a;
                }
            });
        }
    }
    pixmap
}

/// Pre-renders one cue into a standalone pixmap. Vector stand-ins for
/// the task's imagery: plane silhouette, fuel gauge, trigger square,
/// fixation cross.
pub fn render_cue_pixmap(cue: CueKind) -> Pixmap {
    match cue {
        CueKind::Fixation => {
            let size = 40u32;
            let mut pm = Pixmap::new(size, size).expect("fixation pixmap");
            let mut paint = Paint::default();
            paint.anti_alias = false;
            paint.set_color(Color::from_rgba8(255, 255, 255, 255));
            let h = Rect::from_xywh(0.0, (size as f32 - 2.0) * 0.5, size as f32, 2.0)
                .expect("fixation bar");
            pm.fill_rect(h, &paint, Transform::identity(), None);
            let v = Rect::from_xywh((size as f32 - 2.0) * 0.5, 0.0, 2.0, size as f32)
                .expect("fixation bar");
            pm.fill_rect(v, &paint, Transform::identity(), None);
            pm
        }
        CueKind::Plane(direction) => {
            let (w, h) = (180u32, 110u32);
            let mut pm = Pixmap::new(w, h).expect("plane pixmap");
            let mut paint = Paint::default();
            paint.anti_alias = true;
            paint.set_color(Color::from_rgba8(235, 235, 235, 255));

            // Drawn nose-right; the left-facing plane is the mirror.
            let mut pb = PathBuilder::new();
            // Fuselage.
            pb.move_to(20.0, 48.0);
            pb.line_to(132.0, 48.0);
            pb.line_to(132.0, 66.0);
            pb.line_to(20.0, 66.0);
            pb.close();
            // Nose.
            pb.move_to(132.0, 40.0);
            pb.line_to(176.0, 57.0);
            pb.line_to(132.0, 74.0);
            pb.close();
            // Wings.
            pb.move_to(70.0, 10.0);
            pb.line_to(100.0, 48.0);
            pb.line_to(64.0, 48.0);
            pb.close();
            pb.move_to(70.0, 100.0);
            pb.line_to(100.0, 66.0);
            pb.line_to(64.0, 66.0);
            pb.close();
            // Tail fin.
            pb.move_to(20.0, 26.0);
            pb.line_to(40.0, 48.0);
            pb.line_to(20.0, 48.0);
            pb.close();
            let path = pb.finish().expect("plane path");

            let transform = match direction {
                Direction::Right => Transform::identity(),
                Direction::Left => Transform::from_scale(-1.0, 1.0).post_translate(w as f32, 0.0),
            };
            pm.fill_path(&path, &paint, FillRule::Winding, transform, None);
            pm
        }
        CueKind::FuelGauge => {
            let size = 90u32;
            let c = size as f32 * 0.5;
            let mut pm = Pixmap::new(size, size).expect("fuel pixmap");
            let mut paint = Paint::default();
            paint.anti_alias = true;
            paint.set_color(Color::from_rgba8(250, 200, 40, 255));

            let mut ring = PathBuilder::new();
            ring.push_circle(c, c, c - 6.0);
            let ring = ring.finish().expect("gauge ring");
            let stroke = Stroke {
                width: 5.0,
                ..Stroke::default()
            };
            pm.stroke_path(&ring, &paint, &stroke, Transform::identity(), None);

            // Needle hard against the empty stop.
            let mut needle = PathBuilder::new();
            needle.move_to(c, c);
            needle.line_to(c - (c - 14.0) * 0.707, c + (c - 14.0) * 0.707);
            let needle = needle.finish().expect("gauge needle");
            paint.set_color(Color::from_rgba8(220, 40, 40, 255));
            pm.stroke_path(&needle, &paint, &stroke, Transform::identity(), None);

            // Hub.
            let mut hub = PathBuilder::new();
            hub.push_circle(c, c, 5.0);
            let hub = hub.finish().expect("gauge hub");
            pm.fill_path(&hub, &paint, FillRule::Winding, Transform::identity(), None);
            pm
        }
        CueKind::TriggerMark => {
            let size = 64u32;
            let mut pm = Pixmap::new(size, size).expect("trigger pixmap");
            pm.fill(Color::from_rgba8(255, 255, 255, 255));
            pm
        }
    }
}

/// Vertical top-left origins for a centered stack of `count` lines.
pub fn message_line_origins(count: usize, line_h: f32, center_y: f32) -> Vec<f32> {
    let total = count as f32 * line_h;
    (0..count)
        .map(|i| center_y - total * 0.5 + i as f32 * line_h)
        .collect()
}

/// Composes frames from the session's `VisualState`: black field, cues
/// blitted from a static pixmap cache, text through the label interner.
pub struct TaskRenderer {
    width: u32,
    height: u32,
    center: (f32, f32),
    cue_cache: Vec<Pixmap>,
    message_cache: TextCache,
    label_cache: TextCache,
    canvas: Pixmap,
}

impl TaskRenderer {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let font = Arc::new(load_font()?);
        let canvas =
            Pixmap::new(width, height).ok_or_else(|| anyhow!("zero-sized surface"))?;

        let cue_cache = (0..CueKind::CACHE_SLOTS)
            .map(|slot| render_cue_pixmap(cue_for_slot(slot)))
            .collect();

        Ok(Self {
            width,
            height,
            center: (width as f32 * 0.5, height as f32 * 0.5),
            cue_cache,
            message_cache: TextCache::new(Arc::clone(&font), MESSAGE_PX),
            label_cache: TextCache::new(font, LABEL_PX),
            canvas,
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if let Some(canvas) = Pixmap::new(width, height) {
            self.width = width;
            self.height = height;
            self.center = (width as f32 * 0.5, height as f32 * 0.5);
            self.canvas = canvas;
        }
    }

    pub fn render_frame(
        &mut self,
        visuals: &VisualState,
        progress: Option<(usize, usize)>,
        frame: &mut [u8],
    ) -> Result<()> {
        self.canvas.fill(Color::from_rgba8(0, 0, 0, 255));

        if visuals.fixation {
            self.blit_cue(CueKind::Fixation, self.center);
        }
        if let Some(direction) = visuals.primary {
            self.blit_cue(CueKind::Plane(direction), self.center);
        }
        if visuals.secondary_cue {
            // Drawn after the plane, on top of it, like the original
            // task's overlapping image stimuli.
            self.blit_cue(CueKind::FuelGauge, self.center);
        }
        if visuals.trigger_mark {
            let pos = (self.width as f32 * 0.92, self.height as f32 * 0.88);
            self.blit_cue(CueKind::TriggerMark, pos);
        }
        if let Some(feedback) = visuals.feedback {
            let color = match feedback {
                Feedback::Correct => LIME,
                Feedback::Incorrect => RED,
                Feedback::Timeout => WHITE,
            };
            let pos = (self.center.0, self.center.1 + 90.0);
            self.draw_label(feedback.label(), color, pos);
        }
        if let Some(message) = &visuals.message {
            self.draw_message(message);
        }
        if let Some((current, total)) = progress {
            let text = format!("Trial: {}/{}", current, total);
            let pos = (self.width as f32 - 110.0, 36.0);
            self.draw_label(&text, GRAY, pos);
        }

        let data = self.canvas.data();
        if frame.len() != data.len() {
            return Err(anyhow!(
                "frame buffer is {} bytes, surface needs {}",
                frame.len(),
                data.len()
            ));
        }
        frame.copy_from_slice(data);
        Ok(())
    }

    fn blit_cue(&mut self, cue: CueKind, pos: (f32, f32)) {
        let pixmap = &self.cue_cache[cue.cache_id()];
        let x = (pos.0 - pixmap.width() as f32 * 0.5).round() as i32;
        let y = (pos.1 - pixmap.height() as f32 * 0.5).round() as i32;
        self.canvas.draw_pixmap(
            x,
            y,
            pixmap.as_ref(),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );
    }

    fn draw_label(&mut self, text: &str, color: [u8; 4], pos: (f32, f32)) {
        let id = intern_label(text);
        let pixmap = self.label_cache.get_or_render(id, color);
        let pm: &Pixmap = &pixmap;
        let x = (pos.0 - pm.width() as f32 * 0.5).round() as i32;
        let y = (pos.1 - pm.height() as f32 * 0.5).round() as i32;
        self.canvas.draw_pixmap(
            x,
            y,
            pm.as_ref(),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );
    }

    fn draw_message(&mut self, message: &str) {
        let lines: Vec<&str> = message.lines().collect();
        let line_h = MESSAGE_PX * 1.4;
        let origins = message_line_origins(lines.len(), line_h, self.center.1);
        for (line, top) in lines.iter().zip(origins) {
            if line.trim().is_empty() {
                continue;
            }
            let id = intern_label(line);
            let pixmap = self.message_cache.get_or_render(id, WHITE);
            let pm: &Pixmap = &pixmap;
            let x = (self.center.0 - pm.width() as f32 * 0.5).round() as i32;
            self.canvas.draw_pixmap(
                x,
                top.round() as i32,
                pm.as_ref(),
                &PixmapPaint::default(),
                Transform::identity(),
                None,
            );
        }
    }
}

fn cue_for_slot(slot: usize) -> CueKind {
    match slot {
        0 => CueKind::Fixation,
        1 => CueKind::Plane(Direction::Left),
        2 => CueKind::Plane(Direction::Right),
        3 => CueKind::FuelGauge,
        _ => CueKind::TriggerMark,
    }
}

/// The font is looked up on disk at startup; nothing is embedded. An
/// `assets/` override next to the binary wins over system fonts.
fn load_font() -> Result<FontVec> {
    const CANDIDATES: &[&str] = &[
        "assets/DejaVuSans.ttf",
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/TTF/DejaVuSans.ttf",
        "/usr/share/fonts/dejavu/DejaVuSans.ttf",
        "/System/Library/Fonts/Supplemental/Arial.ttf",
        "C:\\Windows\\Fonts\\arial.ttf",
    ];
    for path in CANDIDATES {
        if let Ok(bytes) = std::fs::read(path) {
            return FontVec::try_from_vec(bytes)
                .with_context(|| format!("unusable font at {}", path));
        }
    }
    Err(anyhow!(
        "no usable font found; place a TTF at assets/DejaVuSans.ttf"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opaque_pixels(pm: &Pixmap) -> usize {
        pm.data().chunks_exact(4).filter(|px| px[3] > 0).count()
    }

    #[test]
    fn every_cue_slot_renders_something() {
        for slot in 0..CueKind::CACHE_SLOTS {
            let pm = render_cue_pixmap(cue_for_slot(slot));
            assert!(opaque_pixels(&pm) > 0, "slot {} is blank", slot);
        }
    }

    #[test]
    fn left_and_right_planes_are_mirror_images() {
        let left = render_cue_pixmap(CueKind::Plane(Direction::Left));
        let right = render_cue_pixmap(CueKind::Plane(Direction::Right));
        assert_eq!(left.width(), right.width());
        let diff = opaque_pixels(&left).abs_diff(opaque_pixels(&right));
        // Anti-aliased edges may differ by a handful of pixels.
        assert!(diff < 64, "mirrored planes differ by {} pixels", diff);
        assert_ne!(left.data(), right.data());
    }

    #[test]
    fn trigger_mark_is_fully_opaque() {
        let pm = render_cue_pixmap(CueKind::TriggerMark);
        assert_eq!(opaque_pixels(&pm), (pm.width() * pm.height()) as usize);
    }

    #[test]
    fn message_lines_stack_around_the_center() {
        let origins = message_line_origins(4, 10.0, 100.0);
        assert_eq!(origins, vec![80.0, 90.0, 100.0, 110.0]);
        // Symmetric about the center line.
        assert_eq!(origins[0] + 4.0 * 10.0, 120.0);
        assert!(message_line_origins(0, 10.0, 100.0).is_empty());
    }
}
