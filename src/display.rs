use std::collections::BTreeMap;
use std::io;

use crossterm::cursor::{Hide, Show};
use crossterm::execute;
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use tui::backend::CrosstermBackend;
use tui::style::{Color, Style};
use tui::symbols::Marker;
use tui::widgets::canvas::{Canvas, Line, Points};
use tui::widgets::{Block, Borders};
use tui::Terminal;

use crate::presenter::{Rgba, Surface};

/// Display is where presented surfaces end up. It should abstract the
/// implementation details, so a variety of kinds of screen would work.
pub trait Display {
    /// put a rendered surface on screen
    fn draw(&mut self, frame: &Surface) -> Result<(), io::Error>;
}

// canvas coordinates for a surface, sampled every `step` pixels starting
// `offset` in, so samples land on cell centres and never on grid lines
struct Resolution {
    width: usize,
    height: usize,
    step: usize,
    offset: usize,
}

impl Resolution {
    /// sample every `cells_per_dot`th cell of `frame`
    fn for_surface(frame: &Surface, cells_per_dot: usize) -> Self {
        let scale = frame.scale.max(1);
        Resolution {
            width: frame.width,
            height: frame.height,
            step: scale * cells_per_dot.max(1),
            offset: scale / 2,
        }
    }

    fn x_bounds(&self) -> [f64; 2] {
        [0.0, self.width.saturating_sub(1) as f64]
    }

    fn y_bounds(&self) -> [f64; 2] {
        [-1.0 * self.height.saturating_sub(1) as f64, 0.0]
    }

    /// sampled pixels grouped by luminance, so each group can be painted
    /// in one go with its own grey
    fn luminance_planes(&self, frame: &Surface) -> BTreeMap<u8, Vec<(f64, f64)>> {
        let mut planes: BTreeMap<u8, Vec<(f64, f64)>> = BTreeMap::new();
        for y in (self.offset..frame.height).step_by(self.step) {
            for x in (self.offset..frame.width).step_by(self.step) {
                let i = (y * frame.width + x) * 4;
                planes
                    .entry(frame.pixels[i])
                    .or_default()
                    .push((x as f64, -1.0 * y as f64));
            }
        }
        planes
    }

    /// interior cell boundaries as (x1, y1, x2, y2), in canvas space
    fn grid_lines(&self, scale: usize) -> Vec<(f64, f64, f64, f64)> {
        let (right, bottom) = (self.x_bounds()[1], self.y_bounds()[0]);
        let scale = scale.max(1);
        let verticals = (scale..self.width)
            .step_by(scale)
            .map(|x| (x as f64, 0.0, x as f64, bottom));
        let horizontals = (scale..self.height)
            .step_by(scale)
            .map(|y| (0.0, -1.0 * y as f64, right, -1.0 * y as f64));
        verticals.chain(horizontals).collect()
    }
}

/// surface painted onto a terminal canvas, rendered using TUI and crossterm
pub struct TermDisplay {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
}

impl TermDisplay {
    /// takes over the terminal: raw mode, alternate screen, hidden cursor
    pub fn new() -> Result<TermDisplay, io::Error> {
        terminal::enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, Hide)?;
        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;
        Ok(TermDisplay { terminal })
    }
}

impl Drop for TermDisplay {
    fn drop(&mut self) {
        let _ = execute!(io::stdout(), LeaveAlternateScreen, Show);
        let _ = terminal::disable_raw_mode();
    }
}

impl Display for TermDisplay {
    fn draw(&mut self, frame: &Surface) -> Result<(), io::Error> {
        self.terminal.draw(|f| {
            let size = f.size();
            // braille gives 2x4 dots per cell; no point sampling finer
            let dots_x = (size.width.saturating_sub(2) as usize * 2).max(1);
            let cells_x = frame.width / frame.scale.max(1);
            let cells_per_dot = (cells_x / dots_x).max(1);
            let resolution = Resolution::for_surface(frame, cells_per_dot);
            // a grid only makes sense when every cell gets its own dots
            let grid = match frame.grid {
                Some(Rgba(r, g, b, _)) if cells_per_dot == 1 => {
                    Some((Color::Rgb(r, g, b), resolution.grid_lines(frame.scale)))
                }
                _ => None,
            };

            let canvas = Canvas::default()
                .block(
                    Block::default()
                        .title("CHIP-8")
                        .borders(Borders::ALL)
                        .style(Style::default().bg(Color::Black)),
                )
                .x_bounds(resolution.x_bounds())
                .y_bounds(resolution.y_bounds())
                .marker(Marker::Braille)
                .paint(|ctx| {
                    for (l, coords) in resolution.luminance_planes(frame) {
                        ctx.draw(&Points {
                            coords: &coords,
                            color: Color::Rgb(l, l, l),
                        });
                    }
                    if let Some((color, lines)) = &grid {
                        for &(x1, y1, x2, y2) in lines {
                            ctx.draw(&Line {
                                x1,
                                y1,
                                x2,
                                y2,
                                color: *color,
                            });
                        }
                    }
                });
            f.render_widget(canvas, size);
        })?;
        Ok(())
    }
}

/// keeps every surface it's given; useful for testing the host loop
#[derive(Default)]
pub struct RecordingDisplay {
    pub frames: Vec<Surface>,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        RecordingDisplay { frames: Vec::new() }
    }

    pub fn last(&self) -> Option<&Surface> {
        self.frames.last()
    }
}

impl Display for RecordingDisplay {
    fn draw(&mut self, frame: &Surface) -> Result<(), io::Error> {
        self.frames.push(frame.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presenter::{render, Presenter, GRID_COLOUR};

    #[test]
    fn test_x_bounds() {
        let r = Resolution {
            width: 64,
            height: 32,
            step: 1,
            offset: 0,
        };
        assert_eq!(r.x_bounds(), [0.0, 63.0]);
    }

    #[test]
    fn test_y_bounds() {
        let r = Resolution {
            width: 64,
            height: 32,
            step: 1,
            offset: 0,
        };
        assert_eq!(r.y_bounds(), [-31.0, 0.0]);
    }

    #[test]
    fn test_planes_split_by_luminance() {
        let frame = render(&[0xff, 0, 0, 0x80], 2, 2, 1);
        let r = Resolution::for_surface(&frame, 1);
        let planes = r.luminance_planes(&frame);
        assert_eq!(planes.len(), 3);
        assert_eq!(planes[&0xff], vec![(0.0, 0.0)]);
        assert_eq!(planes[&0x00], vec![(1.0, 0.0), (0.0, -1.0)]);
        assert_eq!(planes[&0x80], vec![(1.0, -1.0)]);
    }

    #[test]
    fn test_planes_sampled_at_cell_centres() {
        let frame = render(&[0xff; 64 * 32], 64, 32, 10);
        let r = Resolution::for_surface(&frame, 1);
        let planes = r.luminance_planes(&frame);
        assert_eq!(planes[&0xff].len(), 64 * 32);
        assert_eq!(planes[&0xff][0], (5.0, -5.0));
    }

    #[test]
    fn test_grid_never_sampled() {
        let p = Presenter::new(4, 2, 4).with_grid(GRID_COLOUR);
        let frame = p.present(&[0xff; 8]);
        for cells_per_dot in 1..3 {
            let planes = Resolution::for_surface(&frame, cells_per_dot).luminance_planes(&frame);
            assert_eq!(planes.keys().copied().collect::<Vec<u8>>(), vec![0xff]);
        }
    }

    #[test]
    fn test_grid_lines_on_every_boundary() {
        let frame = render(&[0; 4 * 2], 4, 2, 4);
        let lines = Resolution::for_surface(&frame, 1).grid_lines(frame.scale);
        assert_eq!(
            lines,
            vec![
                (4.0, 0.0, 4.0, -7.0),
                (8.0, 0.0, 8.0, -7.0),
                (12.0, 0.0, 12.0, -7.0),
                (0.0, -4.0, 15.0, -4.0),
            ]
        );
    }

    #[test]
    fn test_recording_display_keeps_frames() -> Result<(), io::Error> {
        let mut d = RecordingDisplay::new();
        assert!(d.last().is_none());
        d.draw(&render(&[0], 1, 1, 1))?;
        d.draw(&render(&[0xff], 1, 1, 1))?;
        assert_eq!(d.frames.len(), 2);
        assert_eq!(d.last().map(|s| s.pixels[0]), Some(0xff));
        Ok(())
    }
}
