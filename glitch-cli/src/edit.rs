//! Live melody editor: a 16×16 character grid with playback
//!
//! One cooperative loop interleaves frame rendering (gated on the audio
//! queue having room), input polling, and redrawing. Edits rebuild the
//! token list and zero the VM while the sample counter keeps running, so
//! the voice changes without losing its place in time.

use std::collections::BTreeSet;
use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    queue,
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor},
    terminal::{self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen},
};
use glitch::{Melody, LINE_COUNT, LINE_WIDTH};
use player::{Output, Renderer, FRAME_SIZE};

/// Characters reachable with PageUp / PageDown, in cycle order
const KEY_ORDER: &str = "0123456789ABCDEFabcdefghjklmnopqrstu.";

/// Eighth-height bars for the waveform readout
const WAVE_BLOCKS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

const HELP: &str =
    "arrows move  0-9 a-f hex  t * / + - < > = ops  pgup/pgdn cycle  m mute  esc rewind  q save";

/// Maps a typed key to the grid character it enters, if any
///
/// Hex digits are entered directly (lowercase promoted, since `a-f` in a
/// program are opcodes); the common operators sit on their symbol keys;
/// everything else is reached by cycling.
fn decode_key(c: char) -> Option<char> {
    let out = match c {
        ' ' | '.' => '.',
        't' => 'a',
        '*' => 'd',
        '/' => 'e',
        '+' => 'f',
        '-' => 'g',
        '<' => 's',
        '>' => 't',
        '=' => 'u',
        '0'..='9' => c,
        'A'..='F' => c,
        'a'..='f' => c.to_ascii_uppercase(),
        _ => return None,
    };
    Some(out)
}

struct Terminal;

impl Terminal {
    fn enter() -> io::Result<()> {
        let mut stdout = io::stdout();
        terminal::enable_raw_mode()?;
        crossterm::execute!(stdout, EnterAlternateScreen, cursor::Hide)
    }

    fn exit() -> io::Result<()> {
        let mut stdout = io::stdout();
        terminal::disable_raw_mode()?;
        crossterm::execute!(stdout, LeaveAlternateScreen, cursor::Show)
    }
}

struct Editor {
    renderer: Renderer,
    output: Output,

    /// Cursor position in the program grid, as (row, col)
    cursor: (usize, usize),

    /// Samples of the most recent frame, for the waveform readout
    wave: [u8; FRAME_SIZE],
    dropped: bool,
    status: String,
}

impl Editor {
    fn new(melody: Melody) -> Self {
        let status = format!("now playing: {melody}");
        Self {
            renderer: Renderer::new(melody),
            output: Output::new(),
            cursor: (0, 0),
            wave: [0; FRAME_SIZE],
            dropped: false,
            status,
        }
    }

    fn run(&mut self) -> Result<()> {
        let mut redraw = true;
        loop {
            if self.output.ready() {
                let frame = self.renderer.next_frame();
                self.output.push(&frame);
                self.wave = frame.samples;
                self.dropped = frame.dropped;
                redraw = true;
            }
            if redraw {
                self.draw()?;
                redraw = false;
            }
            if event::poll(Duration::from_millis(5))? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        if self.handle_key(key)? {
                            return Ok(());
                        }
                        redraw = true;
                    }
                    Event::Resize(..) => redraw = true,
                    _ => (),
                }
            }
        }
    }

    /// Applies one key press; returns true on quit
    fn handle_key(&mut self, key: KeyEvent) -> Result<bool> {
        let (row, col) = self.cursor;
        match key.code {
            KeyCode::Char('q') => return Ok(true),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Ok(true)
            }
            KeyCode::Left => self.cursor.1 = col.saturating_sub(1),
            KeyCode::Right => self.cursor.1 = (col + 1).min(LINE_WIDTH - 1),
            KeyCode::Up => self.cursor.0 = row.saturating_sub(1),
            KeyCode::Down => self.cursor.0 = (row + 1).min(LINE_COUNT - 1),
            KeyCode::Home => self.cursor.1 = 0,
            KeyCode::End => self.cursor.1 = LINE_WIDTH - 1,
            KeyCode::Esc => {
                self.renderer.rewind();
                self.status = "rewound to t = 0".to_owned();
            }
            KeyCode::PageUp => self.cycle(-1)?,
            KeyCode::PageDown => self.cycle(1)?,
            KeyCode::Char('m') => self.toggle_mute(),
            KeyCode::Char(c) => {
                if let Some(entered) = decode_key(c) {
                    self.edit(row, col, entered)?;
                }
            }
            _ => (),
        }
        Ok(false)
    }

    fn edit(&mut self, row: usize, col: usize, c: char) -> Result<()> {
        self.renderer.edit_char(row, col, c)?;
        self.status = format!("now playing: {}", self.renderer.melody());
        Ok(())
    }

    /// Steps the cell under the cursor through [`KEY_ORDER`]
    fn cycle(&mut self, step: isize) -> Result<()> {
        let (row, col) = self.cursor;
        let current = self.renderer.melody().lines()[row].as_bytes()[col] as char;
        let order = KEY_ORDER.as_bytes();
        // Unknown characters restart the cycle from the trailing NOP
        let i = KEY_ORDER.find(current).unwrap_or(order.len() - 1) as isize;
        let next = order[(i + step).rem_euclid(order.len() as isize) as usize] as char;
        self.edit(row, col, next)
    }

    fn toggle_mute(&mut self) {
        let row = self.cursor.0;
        let mut muted: BTreeSet<usize> = self.renderer.melody().muted().clone();
        if !muted.remove(&row) {
            muted.insert(row);
        }
        self.renderer.set_muted(muted);
        self.status = format!("now playing: {}", self.renderer.melody());
    }

    fn draw(&self) -> io::Result<()> {
        let mut stdout = io::stdout();
        queue!(stdout, Clear(ClearType::All), cursor::MoveTo(0, 0))?;

        // Waveform over the last frame, plus the sample counter; `!`
        // flags a frame that rendered slower than it plays
        let wave: String = self
            .wave
            .iter()
            .step_by(4)
            .map(|&s| WAVE_BLOCKS[usize::from(s) >> 5])
            .collect();
        let marker = if self.dropped { '!' } else { ' ' };
        queue!(
            stdout,
            SetForegroundColor(Color::Blue),
            Print(&wave),
            ResetColor,
            Print(format!(" {marker} {:08X}", self.renderer.t())),
            cursor::MoveToNextLine(2),
        )?;

        let melody = self.renderer.melody();
        queue!(stdout, Print(melody.title()), cursor::MoveToNextLine(2))?;

        for (row, line) in melody.lines().iter().enumerate() {
            if melody.muted().contains(&row) {
                queue!(stdout, SetForegroundColor(Color::DarkGrey), Print("x "))?;
            } else {
                queue!(stdout, Print("  "))?;
            }
            for (col, c) in line.chars().enumerate() {
                if (row, col) == self.cursor {
                    queue!(
                        stdout,
                        SetAttribute(Attribute::Reverse),
                        Print(c),
                        SetAttribute(Attribute::NoReverse),
                    )?;
                } else {
                    queue!(stdout, Print(c))?;
                }
            }
            queue!(stdout, ResetColor, cursor::MoveToNextLine(1))?;
        }

        queue!(
            stdout,
            cursor::MoveToNextLine(1),
            Print(&self.status),
            cursor::MoveToNextLine(1),
            SetForegroundColor(Color::DarkGrey),
            Print(HELP),
            ResetColor,
        )?;
        stdout.flush()
    }
}

/// Opens `path`, runs the editor, and writes the canonical form back on
/// quit
pub fn run(path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to open {path:?}"))?;
    let mut melody = Melody::new(&text)?;
    melody.expand();

    let mut editor = Editor::new(melody);
    Terminal::enter().context("failed to set up terminal")?;
    let result = editor.run();
    Terminal::exit().context("failed to restore terminal")?;
    result?;

    let melody = editor.renderer.melody();
    std::fs::write(path, format!("{melody}\n"))
        .with_context(|| format!("failed to save {path:?}"))?;
    eprintln!("{melody} saved.");
    Ok(())
}
