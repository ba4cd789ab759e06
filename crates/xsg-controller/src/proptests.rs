//! Property-based tests for xsg-controller

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, SocketAddr};
    use std::time::Duration;

    use proptest::prelude::*;
    use xsg_core::{DeviceState, MediaPlayback};

    use crate::cli::reconnect_delay;
    use crate::config::{parse_console_address, CliOverrides, Config};
    use crate::output::{DeviceStateOutput, OutputFormat, OutputFormatter};

    fn format_strategy() -> impl Strategy<Value = String> {
        prop_oneof![Just("table"), Just("json"), Just("quiet")].prop_map(str::to_string)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// A bare IPv4 address picks up the default port; an explicit port wins.
        #[test]
        fn console_address_parsing(octets in any::<[u8; 4]>(), port in 1u16.., default_port in 1u16..) {
            let ip = Ipv4Addr::from(octets);
            prop_assert_eq!(
                parse_console_address(&ip.to_string(), default_port).unwrap(),
                SocketAddr::new(ip.into(), default_port)
            );
            prop_assert_eq!(
                parse_console_address(&format!("{ip}:{port}"), default_port).unwrap(),
                SocketAddr::new(ip.into(), port)
            );
        }

        /// CLI flags always take precedence over file values, and absent
        /// flags leave the file values alone.
        #[test]
        fn cli_overrides_take_precedence(
            file_format in format_strategy(),
            cli_format in proptest::option::of(format_strategy()),
            cli_live_id in proptest::option::of("[0-9A-F]{16}"),
        ) {
            let mut config = Config::default();
            config.output.format = file_format.clone();
            config.console.live_id = Some("FILE".into());

            let overrides = CliOverrides {
                output_format: cli_format.clone(),
                live_id: cli_live_id.clone(),
                ..CliOverrides::default()
            };
            let merged = config.with_overrides(&overrides);

            prop_assert_eq!(merged.output.format.clone(), cli_format.unwrap_or(file_format));
            prop_assert_eq!(merged.console.live_id.clone(), Some(cli_live_id.unwrap_or_else(|| "FILE".into())));
            prop_assert!(merged.validate().is_ok());
        }

        /// Session settings survive the TOML round trip into core durations.
        #[test]
        fn session_settings_map_to_core(
            heartbeat_ms in 1u64..60_000,
            loss in 1u32..10,
            command_ms in 1u64..60_000,
        ) {
            let mut config = Config::default();
            config.session.heartbeat_interval_ms = heartbeat_ms;
            config.session.heartbeat_loss_intervals = loss;
            config.session.command_timeout_ms = command_ms;

            let text = toml::to_string(&config).unwrap();
            let parsed: Config = toml::from_str(&text).unwrap();
            let session = parsed.session_config();

            prop_assert_eq!(session.heartbeat_interval, Duration::from_millis(heartbeat_ms));
            prop_assert_eq!(session.command_timeout, Duration::from_millis(command_ms));
            prop_assert_eq!(session.connection_loss_after(), Duration::from_millis(heartbeat_ms) * loss);
        }

        /// Backoff never decreases and never exceeds the cap.
        #[test]
        fn reconnect_delay_is_monotonic_and_bounded(attempt in 0u32..100, base_ms in 1u64..5_000) {
            let base = Duration::from_millis(base_ms);
            let max = Duration::from_secs(30);
            let now = reconnect_delay(attempt, base, max);
            let next = reconnect_delay(attempt + 1, base, max);
            prop_assert!(now <= next);
            prop_assert!(next <= max);
            prop_assert!(now >= base.min(max));
        }

        /// JSON device state output always carries every field.
        #[test]
        fn device_state_json_has_stable_schema(
            power in any::<bool>(),
            title_id in proptest::option::of(any::<u32>()),
            volume in 0u8..=100,
            muted in any::<bool>(),
        ) {
            let state = DeviceState {
                power,
                title_id,
                volume,
                muted,
                media: MediaPlayback::Paused,
                ..DeviceState::default()
            };
            let formatter = OutputFormatter::new(OutputFormat::Json, false);
            let value: serde_json::Value = serde_json::from_str(&formatter.format_device_state(&state)).unwrap();
            let data = &value["data"];
            for key in ["power", "title_id", "active_reference", "volume", "muted", "media", "firmware", "locale"] {
                prop_assert!(data.get(key).is_some(), "missing {}", key);
            }
            prop_assert_eq!(data["volume"].as_u64(), Some(volume as u64));
            prop_assert_eq!(
                DeviceStateOutput::from(&state).title_id,
                title_id.map(|id| format!("0x{id:08X}"))
            );
        }
    }
}
