use smlang::statemachine;

use crate::config::HALF_MINUTE_MS;
use crate::macros::info;

/// Key backlight idle timeout
///
/// While the backlight is on, a counter is incremented every period (half a minute) without
/// key presses. When it reaches the limit the backlight is switched off. Any key press switches
/// it back on and restarts the counting.
pub type Backlight = StateMachine<Context>;

statemachine! {
    transitions: {
        *On + Press / restart = On,
        On + Timeout / switch_off = Off,
        Off + Press / switch_on = On,
    }
}

pub struct Context {
    idle_ms: u16,
    counter: u8,
    period: u16,
    limit: u8,
    output: Option<bool>,
}

impl Context {
    fn reset_idle(&mut self) {
        self.idle_ms = 0;
        self.counter = 0;
    }
}

impl StateMachineContext for Context {
    fn restart(&mut self) {
        self.reset_idle();
    }

    fn switch_off(&mut self) {
        info!("Backlight off");
        self.counter = 0;
        self.output = Some(false);
    }

    fn switch_on(&mut self) {
        info!("Backlight on");
        self.reset_idle();
        self.output = Some(true);
    }
}

impl StateMachine<Context> {
    /// Backlight that turns off after `timeout` minutes without key presses
    pub fn with_timeout(timeout: u8) -> Self {
        Self::with_period(HALF_MINUTE_MS, timeout.saturating_mul(2))
    }

    /// Backlight that turns off after `limit` idle periods of `period` ticks
    pub fn with_period(period: u16, limit: u8) -> Self {
        Self::new(Context {
            idle_ms: 0,
            counter: 0,
            period,
            limit,
            output: None,
        })
    }

    /// Register a key press; returns `Some(true)` if the backlight has to be enabled
    pub fn key_pressed(&mut self) -> Option<bool> {
        self.process_event(Events::Press).ok();
        self.context.output.take()
    }

    /// Advance time by 1 ms; returns `Some(false)` if the backlight has to be disabled
    pub fn tick(&mut self) -> Option<bool> {
        if self.is_on() {
            let ctx = &mut self.context;
            ctx.idle_ms = ctx.idle_ms.saturating_add(1);
            if ctx.idle_ms > ctx.period {
                ctx.counter = ctx.counter.saturating_add(1);
                ctx.idle_ms = 0;
            }
            if ctx.counter >= ctx.limit {
                self.process_event(Events::Timeout).ok();
            }
        }
        self.context.output.take()
    }

    pub fn is_on(&self) -> bool {
        matches!(*self.state(), States::On)
    }

    /// Number of elapsed idle periods
    pub fn idle_periods(&self) -> u8 {
        self.context.counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticks(backlight: &mut Backlight, n: usize) -> Option<bool> {
        let mut out = None;
        for _ in 0..n {
            if let Some(o) = backlight.tick() {
                out = Some(o);
            }
        }
        out
    }

    #[test]
    fn counts_idle_periods() {
        let mut bl = Backlight::with_period(10, 3);
        assert_eq!(ticks(&mut bl, 10), None);
        assert_eq!(bl.idle_periods(), 0);
        assert_eq!(ticks(&mut bl, 1), None);
        assert_eq!(bl.idle_periods(), 1);
        assert_eq!(ticks(&mut bl, 11), None);
        assert_eq!(bl.idle_periods(), 2);
        assert!(bl.is_on());
    }

    #[test]
    fn switches_off_after_limit() {
        let mut bl = Backlight::with_period(10, 3);
        assert_eq!(ticks(&mut bl, 32), None);
        assert!(bl.is_on());
        assert_eq!(ticks(&mut bl, 1), Some(false));
        assert!(!bl.is_on());
        assert_eq!(bl.idle_periods(), 0);
        // No more requests while off
        assert_eq!(ticks(&mut bl, 100), None);
        assert_eq!(bl.idle_periods(), 0);
    }

    #[test]
    fn press_restarts_counting() {
        let mut bl = Backlight::with_period(10, 3);
        ticks(&mut bl, 30);
        assert_eq!(bl.idle_periods(), 2);
        assert_eq!(bl.key_pressed(), None);
        assert_eq!(bl.idle_periods(), 0);
        assert_eq!(ticks(&mut bl, 32), None);
        assert!(bl.is_on());
    }

    #[test]
    fn press_switches_on() {
        let mut bl = Backlight::with_period(10, 1);
        assert_eq!(ticks(&mut bl, 11), Some(false));
        assert_eq!(bl.key_pressed(), Some(true));
        assert!(bl.is_on());
        assert_eq!(bl.idle_periods(), 0);
        assert_eq!(bl.key_pressed(), None);
    }

    #[test]
    fn timeout_in_minutes() {
        let mut bl = Backlight::with_timeout(1);
        assert_eq!(ticks(&mut bl, 2 * (HALF_MINUTE_MS as usize + 1) - 1), None);
        assert_eq!(ticks(&mut bl, 1), Some(false));
    }
}
