//! Host-side stand-ins for the panel lines and the dwell delay.
//!
//! Every pin and the delay write into one shared log, so tests can replay the
//! exact sequence of line changes a refresh produced.

extern crate std;

use core::convert::Infallible;
use std::boxed::Box;
use std::cell::RefCell;
use std::rc::Rc;
use std::vec::Vec;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, OutputPin};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Line {
    Oe,
    A,
    B,
    Clk,
    Lat,
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Event {
    pub line: Line,
    pub high: bool,
}

#[derive(Default)]
struct Log {
    events: Vec<Event>,
    dwells: Vec<u32>,
    on_dwell: Option<Box<dyn FnMut()>>,
}

pub(crate) struct MockPin {
    line: Line,
    log: Rc<RefCell<Log>>,
}

impl ErrorType for MockPin {
    type Error = Infallible;
}

impl OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.log.borrow_mut().events.push(Event {
            line: self.line,
            high: false,
        });
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.log.borrow_mut().events.push(Event {
            line: self.line,
            high: true,
        });
        Ok(())
    }
}

pub(crate) struct MockDelay {
    log: Rc<RefCell<Log>>,
}

impl MockDelay {
    fn dwell(&mut self, us: u32) {
        let hook = {
            let mut log = self.log.borrow_mut();
            log.dwells.push(us);
            log.on_dwell.take()
        };
        // run outside the borrow, the hook may touch the display
        if let Some(mut hook) = hook {
            hook();
            self.log.borrow_mut().on_dwell.get_or_insert(hook);
        }
    }
}

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.dwell(ns / 1_000);
    }

    fn delay_us(&mut self, us: u32) {
        self.dwell(us);
    }
}

pub(crate) type MockPins = (MockPin, MockPin, MockPin, MockPin, MockPin, MockPin);

#[derive(Clone, Default)]
pub(crate) struct Recorder {
    log: Rc<RefCell<Log>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn pin(&self, line: Line) -> MockPin {
        MockPin {
            line,
            log: self.log.clone(),
        }
    }

    pub fn pins(&self) -> MockPins {
        (
            self.pin(Line::Oe),
            self.pin(Line::A),
            self.pin(Line::B),
            self.pin(Line::Clk),
            self.pin(Line::Lat),
            self.pin(Line::Data),
        )
    }

    pub fn delay(&self) -> MockDelay {
        MockDelay {
            log: self.log.clone(),
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.log.borrow().events.clone()
    }

    pub fn dwells(&self) -> Vec<u32> {
        self.log.borrow().dwells.clone()
    }

    /// Run `hook` inside every dwell, as an interrupt firing while the
    /// refresh pass is blocked would.
    pub fn on_dwell(&self, hook: impl FnMut() + 'static) {
        self.log.borrow_mut().on_dwell = Some(Box::new(hook));
    }

    pub fn clear_on_dwell(&self) {
        self.log.borrow_mut().on_dwell = None;
    }

    pub fn reset(&self) {
        let mut log = self.log.borrow_mut();
        log.events.clear();
        log.dwells.clear();
    }

    /// Last level driven on `line`.
    pub fn level(&self, line: Line) -> Option<bool> {
        self.log
            .borrow()
            .events
            .iter()
            .rev()
            .find(|e| e.line == line)
            .map(|e| e.high)
    }

    /// Level of the data line at every rising clock edge.
    pub fn clocked_data(&self) -> Vec<bool> {
        let mut data = false;
        let mut clocked = Vec::new();
        for event in &self.log.borrow().events {
            match event.line {
                Line::Data => data = event.high,
                Line::Clk if event.high => clocked.push(data),
                _ => {}
            }
        }
        clocked
    }

    /// Replay the log as a panel would: every latch yields the selected row
    /// and the bytes shifted since the previous latch, with the data line's
    /// active-low polarity undone.
    pub fn decoded_rows(&self) -> Vec<(usize, Vec<u8>)> {
        let mut a = false;
        let mut b = false;
        let mut data = false;
        let mut bits: Vec<bool> = Vec::new();
        let mut rows = Vec::new();
        for event in &self.log.borrow().events {
            match event.line {
                Line::A => a = event.high,
                Line::B => b = event.high,
                Line::Data => data = event.high,
                Line::Clk if event.high => bits.push(!data),
                Line::Lat if event.high => {
                    let bytes = bits
                        .chunks(8)
                        .map(|chunk| {
                            chunk
                                .iter()
                                .fold(0u8, |byte, on| (byte << 1) | u8::from(*on))
                        })
                        .collect();
                    rows.push((usize::from(a) | (usize::from(b) << 1), bytes));
                    bits.clear();
                }
                _ => {}
            }
        }
        rows
    }
}
