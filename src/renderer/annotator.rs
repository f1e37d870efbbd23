// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 帧标注 (Frame Annotator)
//!
//! 在帧上绘制: 区域 (已启用为闭合多边形,未启用为折线)、检测框/标签/中心点、计数。

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut,
    draw_text_mut, text_size,
};
use imageproc::rect::Rect;
use tracing::{info, warn};

use super::glyphs;
use crate::detection::{ClassNames, FilteredDetection};
use crate::geometry::{Point, Region};

// BGR 调色习惯换成 RGB
pub const COLOR_INSIDE: Rgb<u8> = Rgb([0, 255, 0]);
pub const COLOR_OUTSIDE: Rgb<u8> = Rgb([255, 165, 0]);
pub const COLOR_ZONE: Rgb<u8> = Rgb([0, 200, 255]);
pub const COLOR_DRAFT: Rgb<u8> = Rgb([255, 255, 0]);
pub const COLOR_TEXT: Rgb<u8> = Rgb([255, 255, 255]);
pub const COLOR_PANEL: Rgb<u8> = Rgb([0, 0, 0]);
pub const COLOR_WARN: Rgb<u8> = Rgb([255, 0, 0]);

/// 占位帧默认尺寸
pub const PLACEHOLDER_SIZE: (u32, u32) = (1280, 720);
pub const PLACEHOLDER_TEXT: &str = "NO CAMERA FRAME";

/// 标注输入 (本帧的区域与过滤结果)
#[derive(Clone, Copy)]
pub struct Overlay<'a> {
    /// 当前点列 (未启用时画折线)
    pub points: &'a [Point],
    /// 已启用的区域
    pub region: Option<&'a Region>,
    pub armed: bool,
    pub detections: &'a [FilteredDetection],
    pub names: &'a ClassNames,
    /// (stable, raw)
    pub counts: Option<(u32, u32)>,
}

pub struct Annotator {
    font: Option<FontVec>,
    text_px: f32,
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Annotator {
    pub fn new(font: Option<FontVec>) -> Self {
        Self {
            font,
            text_px: 20.0,
        }
    }

    /// 加载 TrueType 字体,失败时退回点阵字体
    pub fn from_font_path(path: Option<&Path>) -> Self {
        let font = path.and_then(|p| match std::fs::read(p) {
            Ok(bytes) => match FontVec::try_from_vec(bytes) {
                Ok(font) => {
                    info!("🔤 字体已加载: {}", p.display());
                    Some(font)
                }
                Err(e) => {
                    warn!("⚠️ 字体解析失败 {}: {}, 使用点阵字体", p.display(), e);
                    None
                }
            },
            Err(e) => {
                warn!("⚠️ 字体读取失败 {}: {}, 使用点阵字体", p.display(), e);
                None
            }
        });
        Self::new(font)
    }

    /// 标注一帧; 没有帧时什么都不做
    pub fn annotate(&self, frame: Option<&mut RgbImage>, overlay: &Overlay<'_>) {
        let Some(img) = frame else {
            return;
        };
        if img.width() == 0 || img.height() == 0 {
            return;
        }

        self.draw_zone(img, overlay);
        for det in overlay.detections {
            self.draw_detection(img, det, overlay.names);
        }
        self.draw_counts(img, overlay);
    }

    fn draw_zone(&self, img: &mut RgbImage, overlay: &Overlay<'_>) {
        match (overlay.armed, overlay.region) {
            (true, Some(region)) => {
                for (a, b) in region.edges() {
                    thick_line(img, a, b, 2, COLOR_ZONE);
                }
                for p in region.points() {
                    draw_filled_circle_mut(img, (p.x, p.y), 4, COLOR_ZONE);
                }
            }
            _ => {
                for pair in overlay.points.windows(2) {
                    thick_line(img, pair[0], pair[1], 2, COLOR_DRAFT);
                }
                for p in overlay.points {
                    draw_filled_circle_mut(img, (p.x, p.y), 4, COLOR_DRAFT);
                }
            }
        }
    }

    fn draw_detection(&self, img: &mut RgbImage, det: &FilteredDetection, names: &ClassNames) {
        let color = if det.inside {
            COLOR_INSIDE
        } else {
            COLOR_OUTSIDE
        };

        let (tl, br) = det.detection.normalized();
        for t in 0..2 {
            let w = (br.x - tl.x - 2 * t).max(1) as u32;
            let h = (br.y - tl.y - 2 * t).max(1) as u32;
            draw_hollow_rect_mut(img, Rect::at(tl.x + t, tl.y + t).of_size(w, h), color);
        }

        let label = format!(
            "{} {:.2}",
            names.label(det.detection.class_id),
            det.detection.confidence
        );
        let (_, th) = self.text_size(&label);
        let ty = (tl.y - 8 - th as i32).max(2);
        self.draw_text(img, tl.x, ty, &label, color);

        draw_filled_circle_mut(img, (det.center.x, det.center.y), 4, color);
    }

    fn draw_counts(&self, img: &mut RgbImage, overlay: &Overlay<'_>) {
        let text = match overlay.counts {
            Some((stable, raw)) => format!("COUNT: {} (RAW {})", stable, raw),
            None if overlay.armed => "COUNT: -".to_string(),
            None => format!("IDLE - POINTS: {}", overlay.points.len()),
        };
        let (tw, th) = self.text_size(&text);
        draw_filled_rect_mut(img, Rect::at(8, 8).of_size(tw + 12, th + 12), COLOR_PANEL);
        self.draw_text(img, 14, 14, &text, COLOR_TEXT);
    }

    /// 占位帧: 黑底红字 "NO CAMERA FRAME"
    pub fn placeholder(&self, width: u32, height: u32) -> RgbImage {
        let mut img = RgbImage::new(width.max(1), height.max(1));
        let scale = 2.5;
        let x = 40;
        let y = 60;
        match &self.font {
            Some(font) => draw_text_mut(
                &mut img,
                COLOR_WARN,
                x,
                y,
                PxScale::from(self.text_px * scale),
                font,
                PLACEHOLDER_TEXT,
            ),
            None => glyphs::draw_text(
                &mut img,
                x,
                y,
                PLACEHOLDER_TEXT,
                COLOR_WARN,
                self.glyph_scale() * 2 + 1,
            ),
        }
        img
    }

    fn glyph_scale(&self) -> u32 {
        ((self.text_px / (glyphs::GLYPH_HEIGHT + 1) as f32).round() as u32).max(1)
    }

    fn text_size(&self, text: &str) -> (u32, u32) {
        match &self.font {
            Some(font) => text_size(PxScale::from(self.text_px), font, text),
            None => glyphs::text_size(text, self.glyph_scale()),
        }
    }

    fn draw_text(&self, img: &mut RgbImage, x: i32, y: i32, text: &str, color: Rgb<u8>) {
        match &self.font {
            Some(font) => draw_text_mut(img, color, x, y, PxScale::from(self.text_px), font, text),
            None => glyphs::draw_text(img, x, y, text, color, self.glyph_scale()),
        }
    }
}

fn thick_line(img: &mut RgbImage, a: Point, b: Point, width: i32, color: Rgb<u8>) {
    let horizontal = (b.x - a.x).abs() >= (b.y - a.y).abs();
    for o in 0..width {
        let (dx, dy) = if horizontal { (0, o) } else { (o, 0) };
        draw_line_segment_mut(
            img,
            ((a.x + dx) as f32, (a.y + dy) as f32),
            ((b.x + dx) as f32, (b.y + dy) as f32),
            color,
        );
    }
}
