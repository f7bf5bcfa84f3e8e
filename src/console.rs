/// Sink for the human-readable status lines every operation emits.
pub trait Console {
    fn line(&mut self, line: &str);
}

/// Forwards status lines to the `log` facade at info level.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogConsole;

impl Console for LogConsole {
    fn line(&mut self, line: &str) {
        log::info!(target: "sdfiles::console", "{}", line);
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NullConsole;

impl Console for NullConsole {
    fn line(&mut self, _line: &str) {}
}

/// Captures lines, mostly for tests.
impl Console for Vec<String> {
    fn line(&mut self, line: &str) {
        self.push(line.to_string());
    }
}

impl<C: Console + ?Sized> Console for &mut C {
    fn line(&mut self, line: &str) {
        (**self).line(line)
    }
}

macro_rules! console_line {
    ($console:expr, $($arg:tt)*) => {
        $crate::console::Console::line(&mut $console, &format!($($arg)*))
    };
}

pub(crate) use console_line;
