use std::fmt;

pub struct Point {
    pub x: f64,
    pub y: f64,
}

pub enum Shape {
    Circle { radius: f64 },
    Rect { width: f64, height: f64 },
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

impl Shape {
    pub fn area(&self) -> f64 {
        match self {
            Shape::Circle { radius } => std::f64::consts::PI * radius * radius,
            Shape::Rect { width, height } => width * height,
        }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

pub async fn load_points(raw: &str) -> Result<Vec<Point>, String> {
    let mut points = Vec::new();
    for line in raw.lines() {
        let value: f64 = line.trim().parse().map_err(|_| format!("bad line: {line}"))?;
        points.push(Point::new(value, value));
    }
    Ok(points)
}

fn checked_sqrt(value: f64) -> f64 {
    if value < 0.0 {
        panic!("negative input");
    }
    value.sqrt()
}
