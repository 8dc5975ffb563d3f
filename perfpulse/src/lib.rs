pub mod sampling;

#[cfg(feature = "testing")]
pub mod testing {
    use crate::sampling::{BackendResult, CounterInstance, FieldValue};

    use log::LevelFilter;
    use log4rs::append::console::ConsoleAppender;
    use log4rs::config::{Appender, Logger, Root};
    use log4rs::encode::pattern::PatternEncoder;
    use log4rs::Config;
    use std::sync::Once;
    use std::time::Duration;
    use tokio::select;
    use tokio::sync::mpsc::UnboundedReceiver;

    static INIT: Once = Once::new();

    /// Initializes the logger with the specified log level.
    #[macro_export]
    macro_rules! init_logger {
        ($level:expr) => {
            $crate::testing::init_logger_level($level)
        };
        () => {
            $crate::testing::init_logger_level(log::LevelFilter::Trace)
        };
    }

    /// Initializes the logger with the specified log level.
    pub fn init_logger_level(level: LevelFilter) {
        INIT.call_once(|| {
            log4rs::init_config(
                Config::builder()
                    .appender(Appender::builder().build(
                        "stdout",
                        Box::new(
                            ConsoleAppender::builder()
                                .encoder(Box::new(PatternEncoder::new(
                                    "\x1B[37m{d(%Y-%m-%d %H:%M:%S%.3f)}\x1B[0m {h({l:>5.5})} \x1B[37m---\x1B[0m \x1B[37m[{T:>15.15}]\x1B[0m \x1B[36m{t:<50.50}\x1B[0m \x1B[37m:\x1B[0m {m}{n}",
                                )))
                                .build(),
                        ),
                    ))
                    .logger(Logger::builder().build("fx_callback", LevelFilter::Info))
                    .logger(Logger::builder().build("mio", LevelFilter::Info))
                    .logger(Logger::builder().build("tokio", LevelFilter::Info))
                    .build(Root::builder().appender("stdout").build(level))
                    .unwrap(),
            )
            .unwrap();
        })
    }

    /// Assert that the left expression becomes equal to the right expression within the
    /// given timeout, polling the right expression until it matches.
    #[macro_export]
    macro_rules! assert_timeout_eq {
        ($timeout:expr, $left:expr, $right:expr) => {{
            let mut actual_value = $right;
            let result = tokio::select! {
                _ = tokio::time::sleep($timeout) => false,
                result = async {
                    loop {
                        actual_value = $right;
                        if $left == actual_value {
                            return true;
                        }

                        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                    }
                } => result,
            };

            if !result {
                assert!(
                    false,
                    "Assertion timed out after {:?}, expected {} but got {} instead",
                    $timeout, $left, actual_value
                );
            }
        }};
    }

    /// Receive a message from the given receiver, or panic if the timeout is reached.
    #[macro_export]
    macro_rules! recv_timeout {
        ($receiver:expr, $timeout:expr) => {
            $crate::testing::recv_timeout($receiver, $timeout, "expected to receive an instance")
                .await
        };
        ($receiver:expr, $timeout:expr, $message:expr) => {
            $crate::testing::recv_timeout($receiver, $timeout, $message).await
        };
    }

    /// Receive a message from the given receiver, or panic if the timeout is reached.
    ///
    /// # Arguments
    ///
    /// * `receiver` - The receiver to receive the message from.
    /// * `timeout` - The timeout to wait for the message.
    /// * `message` - The message to print if the timeout is reached.
    ///
    /// # Returns
    ///
    /// It returns the received instance of `T`.
    pub async fn recv_timeout<T>(
        receiver: &mut UnboundedReceiver<T>,
        timeout: Duration,
        message: &str,
    ) -> T {
        select! {
            _ = tokio::time::sleep(timeout) => panic!("receiver timed-out after {}ms, {}", timeout.as_millis(), message),
            result = receiver.recv() => result.expect(message)
        }
    }

    /// A counter instance backed by a static in-memory field list.
    #[derive(Debug, Clone, Default)]
    pub struct TestInstance {
        fields: Vec<(String, FieldValue)>,
    }

    impl TestInstance {
        pub fn new() -> Self {
            Self::default()
        }

        /// Add the given field to the instance data.
        pub fn with_field(mut self, name: &str, value: FieldValue) -> Self {
            self.fields.push((name.to_string(), value));
            self
        }
    }

    impl CounterInstance for TestInstance {
        fn field(&self, name: &str) -> BackendResult<Option<FieldValue>> {
            Ok(self
                .fields
                .iter()
                .find(|(field, _)| field.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.clone()))
        }
    }
}
