// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 桌面显示 (macroquad)
//!
//! 显示已标注帧,把鼠标/键盘输入翻译成区域命令。
//! 画面等比缩放居中,鼠标坐标映射回原图像素坐标。

use std::time::Instant;

use image::RgbImage;
use macroquad::prelude::*;

use crate::geometry::Point;

/// 用户命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerCommand {
    /// 左键: 追加区域点 (原图坐标)
    AddPoint(Point),
    /// D: 启用区域
    Arm,
    /// R: 清空区域
    Reset,
    /// Q / Esc: 退出
    Quit,
}

/// 帧在窗口中的放置 (等比缩放 + 居中)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameView {
    pub offset_x: f32,
    pub offset_y: f32,
    pub scale: f32,
    pub frame_w: f32,
    pub frame_h: f32,
}

impl FrameView {
    pub fn fit(frame_w: f32, frame_h: f32, screen_w: f32, screen_h: f32) -> Self {
        let scale = if frame_w > 0.0 && frame_h > 0.0 {
            (screen_w / frame_w).min(screen_h / frame_h)
        } else {
            1.0
        };
        Self {
            offset_x: (screen_w - frame_w * scale) / 2.0,
            offset_y: (screen_h - frame_h * scale) / 2.0,
            scale,
            frame_w,
            frame_h,
        }
    }

    /// 窗口坐标 → 原图坐标,落在画面外返回 None
    pub fn to_frame(&self, sx: f32, sy: f32) -> Option<Point> {
        if self.scale <= 0.0 {
            return None;
        }
        let x = (sx - self.offset_x) / self.scale;
        let y = (sy - self.offset_y) / self.scale;
        if x < 0.0 || y < 0.0 || x >= self.frame_w || y >= self.frame_h {
            return None;
        }
        Some(Point::new(x as i32, y as i32))
    }
}

pub struct Viewer {
    texture: Option<Texture2D>,
    view: Option<FrameView>,
    shown_frame: u64,
    render_count: u64,
    render_last: Instant,
    render_fps: f64,
}

impl Default for Viewer {
    fn default() -> Self {
        Self::new()
    }
}

impl Viewer {
    pub fn new() -> Self {
        Self {
            texture: None,
            view: None,
            shown_frame: 0,
            render_count: 0,
            render_last: Instant::now(),
            render_fps: 0.0,
        }
    }

    /// 上传新帧; 同一帧号不重复上传
    pub fn update(&mut self, frame: &RgbImage, frame_number: u64) {
        if self.texture.is_some() && frame_number == self.shown_frame {
            return;
        }
        self.shown_frame = frame_number;

        let (w, h) = frame.dimensions();
        let rgba = image::DynamicImage::ImageRgb8(frame.clone()).into_rgba8();

        // 只在分辨率变化时重建纹理,否则更新像素数据
        let needs_rebuild = match &self.texture {
            Some(tex) => tex.width() != w as f32 || tex.height() != h as f32,
            None => true,
        };

        if needs_rebuild {
            let texture = Texture2D::from_rgba8(w as u16, h as u16, rgba.as_raw());
            texture.set_filter(FilterMode::Linear);
            self.texture = Some(texture);
        } else if let Some(tex) = &self.texture {
            let img = Image {
                bytes: rgba.into_raw(),
                width: w as u16,
                height: h as u16,
            };
            tex.update(&img);
        }
    }

    pub fn draw(&mut self) {
        clear_background(BLACK);

        if let Some(texture) = &self.texture {
            let view = FrameView::fit(
                texture.width(),
                texture.height(),
                screen_width(),
                screen_height(),
            );
            draw_texture_ex(
                texture,
                view.offset_x,
                view.offset_y,
                WHITE,
                DrawTextureParams {
                    dest_size: Some(vec2(view.frame_w * view.scale, view.frame_h * view.scale)),
                    ..Default::default()
                },
            );
            self.view = Some(view);
        }

        // FPS统计
        self.render_count += 1;
        let now = Instant::now();
        if now.duration_since(self.render_last).as_secs() >= 1 {
            self.render_fps =
                self.render_count as f64 / now.duration_since(self.render_last).as_secs_f64();
            self.render_count = 0;
            self.render_last = now;
        }

        let hint = format!(
            "LMB: add point  D: arm  R: reset  Q: quit  | {:.0} FPS",
            self.render_fps
        );
        draw_text(&hint, 10.0, screen_height() - 10.0, 20.0, WHITE);
    }

    pub fn handle_input(&self) -> Vec<ViewerCommand> {
        let mut commands = Vec::new();

        if is_mouse_button_pressed(MouseButton::Left) {
            let (mx, my) = mouse_position();
            if let Some(p) = self.view.and_then(|v| v.to_frame(mx, my)) {
                commands.push(ViewerCommand::AddPoint(p));
            }
        }
        if is_key_pressed(KeyCode::D) {
            commands.push(ViewerCommand::Arm);
        }
        if is_key_pressed(KeyCode::R) {
            commands.push(ViewerCommand::Reset);
        }
        if is_key_pressed(KeyCode::Q) || is_key_pressed(KeyCode::Escape) {
            commands.push(ViewerCommand::Quit);
        }

        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_letterbox_horizontal_bars() {
        // 1280x720 放进 1280x1024: 上下留黑边
        let v = FrameView::fit(1280.0, 720.0, 1280.0, 1024.0);
        assert!((v.scale - 1.0).abs() < 1e-6);
        assert!((v.offset_y - 152.0).abs() < 1e-3);
        assert_eq!(v.to_frame(640.0, 152.0 + 360.0), Some(Point::new(640, 360)));
        assert_eq!(v.to_frame(640.0, 100.0), None);
    }

    #[test]
    fn test_to_frame_scales() {
        // 窗口是画面的一半
        let v = FrameView::fit(1280.0, 720.0, 640.0, 360.0);
        assert!((v.scale - 0.5).abs() < 1e-6);
        assert_eq!(v.to_frame(50.0, 25.0), Some(Point::new(100, 50)));
        assert_eq!(v.to_frame(640.0, 10.0), None);
    }
}
