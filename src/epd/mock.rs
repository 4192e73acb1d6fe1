//! A board for unit tests that records everything sent to it.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::io;
use std::rc::Rc;
use std::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{self, InputPin, OutputPin};
use embedded_hal::spi::{self, ErrorKind, SpiBus};

use crate::epd::driver::{Board, Lines};
use crate::epd::error::{BoxError, Error};
use crate::epd::interface::{DisplayInterface, SpiPort};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Dc(bool),
    Cs(bool),
    Rst(bool),
    Write(Vec<u8>),
    Sleep(Duration),
    Close,
}

type Log = Rc<RefCell<Vec<Event>>>;

pub type MockInterface = DisplayInterface<MockSpi, MockBusy, MockPin, MockPin, MockPin, MockDelay>;

pub struct MockSpi {
    log: Log,
    max_transfer: usize,
    writes: usize,
    fail_write: Option<usize>,
    fail_close: bool,
}

impl spi::ErrorType for MockSpi {
    type Error = ErrorKind;
}

impl SpiBus<u8> for MockSpi {
    fn read(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        words.fill(0);
        Ok(())
    }

    fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        let n = self.writes;
        self.writes += 1;
        if self.fail_write == Some(n) {
            return Err(ErrorKind::Other);
        }
        self.log.borrow_mut().push(Event::Write(words.to_vec()));
        Ok(())
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
        read.fill(0);
        self.write(write)
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        let sent = words.to_vec();
        words.fill(0);
        self.write(&sent)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl SpiPort for MockSpi {
    fn max_transfer_size(&self) -> usize {
        self.max_transfer
    }

    fn close(self) -> Result<(), BoxError> {
        self.log.borrow_mut().push(Event::Close);
        if self.fail_close {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "spidev went away").into())
        } else {
            Ok(())
        }
    }
}

#[derive(Clone, Copy)]
enum Line {
    Dc,
    Cs,
    Rst,
}

pub struct MockPin {
    log: Log,
    line: Line,
}

impl MockPin {
    fn record(&mut self, level: bool) {
        let event = match self.line {
            Line::Dc => Event::Dc(level),
            Line::Cs => Event::Cs(level),
            Line::Rst => Event::Rst(level),
        };
        self.log.borrow_mut().push(event);
    }
}

impl digital::ErrorType for MockPin {
    type Error = Infallible;
}

impl OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.record(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.record(true);
        Ok(())
    }
}

/// Busy line replaying a script of readings, then settling on `rest`.
pub struct MockBusy {
    script: VecDeque<bool>,
    rest: bool,
}

impl digital::ErrorType for MockBusy {
    type Error = Infallible;
}

impl InputPin for MockBusy {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.script.pop_front().unwrap_or(self.rest))
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}

pub struct MockDelay {
    log: Log,
}

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.log
            .borrow_mut()
            .push(Event::Sleep(Duration::from_nanos(u64::from(ns))));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.log
            .borrow_mut()
            .push(Event::Sleep(Duration::from_millis(u64::from(ms))));
    }
}

pub struct MockBoard {
    log: Log,
    max_transfer: usize,
    busy: Vec<bool>,
    busy_rest: bool,
    fail_write: Option<usize>,
    fail_close: bool,
    fail_acquire: bool,
    acquired: usize,
}

impl MockBoard {
    pub fn new() -> Self {
        MockBoard {
            log: Rc::new(RefCell::new(Vec::new())),
            max_transfer: 4096,
            busy: Vec::new(),
            busy_rest: true,
            fail_write: None,
            fail_close: false,
            fail_acquire: false,
            acquired: 0,
        }
    }

    pub fn with_max_transfer(mut self, max: usize) -> Self {
        self.max_transfer = max;
        self
    }

    /// Report busy this many times before going idle.
    pub fn with_busy_reads(mut self, n: usize) -> Self {
        self.busy = vec![false; n];
        self
    }

    pub fn never_idle(mut self) -> Self {
        self.busy_rest = false;
        self
    }

    /// Fail the `n`th bus write, counting from zero.
    pub fn fail_write(mut self, n: usize) -> Self {
        self.fail_write = Some(n);
        self
    }

    pub fn fail_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn fail_acquire(mut self) -> Self {
        self.fail_acquire = true;
        self
    }

    /// How many times lines were handed out.
    pub fn acquired(&self) -> usize {
        self.acquired
    }

    /// Shared handle on the log that outlives moving the board into a driver.
    pub fn recorder(&self) -> Recorder {
        Recorder {
            log: Rc::clone(&self.log),
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.recorder().events()
    }

    pub fn commands(&self) -> Vec<u8> {
        self.recorder().commands()
    }

    pub fn data_transactions(&self) -> Vec<Vec<u8>> {
        self.recorder().data_transactions()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.recorder().sleeps()
    }
}

impl Board for MockBoard {
    type Spi = MockSpi;
    type Busy = MockBusy;
    type Output = MockPin;
    type ChipSelect = MockPin;
    type Delay = MockDelay;

    fn acquire(&mut self) -> Result<Lines<MockSpi, MockBusy, MockPin, MockPin, MockDelay>, Error> {
        if self.fail_acquire {
            return Err(Error::acquire("could not open SPI", "no such device"));
        }
        self.acquired += 1;
        let log = Rc::clone(&self.log);
        let busy = MockBusy {
            script: self.busy.drain(..).collect(),
            rest: self.busy_rest,
        };
        let pin = |line| MockPin {
            log: Rc::clone(&log),
            line,
        };
        Ok(Lines {
            spi: MockSpi {
                log: Rc::clone(&log),
                max_transfer: self.max_transfer,
                writes: 0,
                fail_write: self.fail_write,
                fail_close: self.fail_close,
            },
            busy,
            dc: pin(Line::Dc),
            rst: pin(Line::Rst),
            cs: pin(Line::Cs),
            delay: MockDelay { log },
        })
    }
}

/// Read side of the shared event log.
#[derive(Clone)]
pub struct Recorder {
    log: Log,
}

impl Recorder {
    pub fn events(&self) -> Vec<Event> {
        self.log.borrow().clone()
    }

    pub fn reset(&self) {
        self.log.borrow_mut().clear();
    }

    /// Every command byte, in order.
    pub fn commands(&self) -> Vec<u8> {
        self.writes(false).into_iter().flatten().collect()
    }

    /// Every data transaction, in order.
    pub fn data_transactions(&self) -> Vec<Vec<u8>> {
        self.writes(true)
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.log
            .borrow()
            .iter()
            .filter_map(|e| match e {
                Event::Sleep(d) => Some(*d),
                _ => None,
            })
            .collect()
    }

    /// Commands interleaved with the data that followed them, as
    /// `(command, data bytes)`.
    pub fn transcript(&self) -> Vec<(u8, Vec<u8>)> {
        let mut out: Vec<(u8, Vec<u8>)> = Vec::new();
        let mut dc = false;
        for event in self.log.borrow().iter() {
            match event {
                Event::Dc(level) => dc = *level,
                Event::Write(bytes) if !dc => out.extend(bytes.iter().map(|b| (*b, Vec::new()))),
                Event::Write(bytes) => {
                    if let Some((_, data)) = out.last_mut() {
                        data.extend_from_slice(bytes);
                    }
                }
                _ => {}
            }
        }
        out
    }

    fn writes(&self, data: bool) -> Vec<Vec<u8>> {
        let mut dc = false;
        let mut out = Vec::new();
        for event in self.log.borrow().iter() {
            match event {
                Event::Dc(level) => dc = *level,
                Event::Write(bytes) if dc == data => out.push(bytes.clone()),
                _ => {}
            }
        }
        out
    }
}
