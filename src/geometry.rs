// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 几何过滤 (Geometry Filter)
//!
//! 由有序点列构建多边形区域,并做点包含测试。
//! 没有有效区域时一律放行 (fail-open): "未画区域" 即 "全部计数"。

use std::fmt;

use serde::{Deserialize, Serialize};

/// 像素坐标点 (整数)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<(i32, i32)> for Point {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

impl From<[i32; 2]> for Point {
    fn from([x, y]: [i32; 2]) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// 多边形区域 (闭合,按点序连线并回到首点)
///
/// 不校验简单性,自相交多边形按奇偶规则处理。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    points: Vec<Point>,
}

impl Region {
    /// 从点列构建区域
    ///
    /// 点数不足3个 (或去重后不足3个不同点) 返回 `None`。
    /// 点列末尾已回到首点时同样接受,闭合点不影响包含测试。
    pub fn build(points: &[Point]) -> Option<Self> {
        if points.len() < 3 {
            return None;
        }

        let mut distinct: Vec<Point> = Vec::with_capacity(points.len());
        for p in points {
            if !distinct.contains(p) {
                distinct.push(*p);
                if distinct.len() >= 3 {
                    break;
                }
            }
        }
        if distinct.len() < 3 {
            return None;
        }

        Some(Self {
            points: points.to_vec(),
        })
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// 点数 (包含闭合点)
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// 边集合,最后一条边回到首点
    pub fn edges(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        let n = self.points.len();
        (0..n).map(move |i| (self.points[i], self.points[(i + 1) % n]))
    }

    /// 包围盒 (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> (i32, i32, i32, i32) {
        self.points.iter().fold(
            (i32::MAX, i32::MAX, i32::MIN, i32::MIN),
            |(x0, y0, x1, y1), p| (x0.min(p.x), y0.min(p.y), x1.max(p.x), y1.max(p.y)),
        )
    }

    /// 点是否在多边形内部或边界上
    pub fn contains_point(&self, p: Point) -> bool {
        let (x0, y0, x1, y1) = self.bounds();
        if p.x < x0 || p.x > x1 || p.y < y0 || p.y > y1 {
            return false;
        }

        // 边界上算在内
        if self.edges().any(|(a, b)| on_segment(a, b, p)) {
            return true;
        }

        // 射线法 (向 +x 方向)
        let (px, py) = (p.x as f64, p.y as f64);
        let mut inside = false;
        for (a, b) in self.edges() {
            if (a.y > p.y) != (b.y > p.y) {
                let (ax, ay) = (a.x as f64, a.y as f64);
                let (bx, by) = (b.x as f64, b.y as f64);
                let cross_x = ax + (py - ay) * (bx - ax) / (by - ay);
                if px < cross_x {
                    inside = !inside;
                }
            }
        }
        inside
    }
}

/// 区域包含测试,`None` 时恒为 true
pub fn contains(region: Option<&Region>, p: Point) -> bool {
    match region {
        Some(region) => region.contains_point(p),
        None => true,
    }
}

fn on_segment(a: Point, b: Point, p: Point) -> bool {
    let (ax, ay) = (a.x as i64, a.y as i64);
    let (bx, by) = (b.x as i64, b.y as i64);
    let (px, py) = (p.x as i64, p.y as i64);

    let cross = (bx - ax) * (py - ay) - (by - ay) * (px - ax);
    if cross != 0 {
        return false;
    }
    px >= ax.min(bx) && px <= ax.max(bx) && py >= ay.min(by) && py <= ay.max(by)
}

/// 解析区域字符串 `"x,y;x,y;x,y"`
pub fn parse_points(s: &str) -> Result<Vec<Point>, String> {
    s.split(';')
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| {
            let (x, y) = chunk
                .split_once(',')
                .ok_or_else(|| format!("区域点格式错误: {chunk:?} (应为 x,y)"))?;
            let x = x
                .trim()
                .parse::<i32>()
                .map_err(|e| format!("区域点 x 坐标无效 {x:?}: {e}"))?;
            let y = y
                .trim()
                .parse::<i32>()
                .map_err(|e| format!("区域点 y 坐标无效 {y:?}: {e}"))?;
            Ok(Point::new(x, y))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Region {
        Region::build(&[
            Point::new(0, 0),
            Point::new(0, 100),
            Point::new(100, 100),
            Point::new(100, 0),
        ])
        .unwrap()
    }

    #[test]
    fn test_build_requires_three_points() {
        assert!(Region::build(&[]).is_none());
        assert!(Region::build(&[Point::new(1, 1)]).is_none());
        assert!(Region::build(&[Point::new(1, 1), Point::new(5, 5)]).is_none());
        assert!(Region::build(&[Point::new(0, 0), Point::new(5, 0), Point::new(0, 5)]).is_some());
    }

    #[test]
    fn test_build_rejects_degenerate_ring() {
        // 三个点但只有两个不同点
        let pts = [Point::new(0, 0), Point::new(10, 10), Point::new(0, 0)];
        assert!(Region::build(&pts).is_none());
    }

    #[test]
    fn test_no_region_is_fail_open() {
        for p in [Point::new(-50, 7), Point::new(0, 0), Point::new(9999, -9999)] {
            assert!(contains(None, p));
        }
    }

    #[test]
    fn test_convex_inside_and_outside() {
        let region = square();
        assert!(contains(Some(&region), Point::new(50, 50)));
        assert!(contains(Some(&region), Point::new(1, 99)));
        assert!(!contains(Some(&region), Point::new(200, 200)));
        assert!(!contains(Some(&region), Point::new(-1, 50)));
        assert!(!contains(Some(&region), Point::new(50, 101)));
    }

    #[test]
    fn test_boundary_is_inside() {
        let region = square();
        assert!(region.contains_point(Point::new(0, 0)));
        assert!(region.contains_point(Point::new(100, 50)));
        assert!(region.contains_point(Point::new(50, 0)));
        assert!(region.contains_point(Point::new(0, 100)));
    }

    #[test]
    fn test_concave_polygon() {
        // U 形: 凹口中间不算在内
        let region = Region::build(&[
            Point::new(0, 0),
            Point::new(30, 0),
            Point::new(30, 60),
            Point::new(60, 60),
            Point::new(60, 0),
            Point::new(90, 0),
            Point::new(90, 90),
            Point::new(0, 90),
        ])
        .unwrap();
        assert!(region.contains_point(Point::new(15, 30)));
        assert!(region.contains_point(Point::new(75, 30)));
        assert!(region.contains_point(Point::new(45, 75)));
        assert!(!region.contains_point(Point::new(45, 30)));
    }

    #[test]
    fn test_closed_ring_matches_open_ring() {
        let open = [Point::new(10, 10), Point::new(80, 20), Point::new(40, 90)];
        let mut closed = open.to_vec();
        closed.push(open[0]);

        let a = Region::build(&open).unwrap();
        let b = Region::build(&closed).unwrap();
        assert_eq!(a.len(), 3);
        assert_eq!(b.points().first(), b.points().last());
        assert_eq!(b.len(), 4);

        for y in (0..100).step_by(3) {
            for x in (0..100).step_by(3) {
                let p = Point::new(x, y);
                assert_eq!(a.contains_point(p), b.contains_point(p), "mismatch at {p}");
            }
        }
    }

    #[test]
    fn test_parse_points() {
        let pts = parse_points("10,20; 30,40;50 , 60;").unwrap();
        assert_eq!(
            pts,
            vec![Point::new(10, 20), Point::new(30, 40), Point::new(50, 60)]
        );
        assert!(parse_points("10;20").is_err());
        assert!(parse_points("a,b").is_err());
        assert!(parse_points("").unwrap().is_empty());
    }
}
