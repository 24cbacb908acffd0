use std::io::Write;
use std::time::Duration;

use matis_modbus::{
    Access, Baudrate, DataType, ModbusError, Parity, RegisterMap, StopBits, TransportConfig, Value,
    WordOrder,
};
use tempfile::NamedTempFile;

#[cfg(test)]
mod transport_config_tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TransportConfig::default();

        assert_eq!(config.serial.port, "/dev/ttyACM0");
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.serial.parity, Parity::Even);
        assert_eq!(config.serial.stop_bits, StopBits::One);
        assert_eq!(config.timeout(), Duration::from_secs(1));
        assert_eq!(config.retries, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_frame_gap_from_baud_rate() {
        let mut config = TransportConfig::default();
        // 9600 8E1: 11 bits per character
        assert_eq!(config.serial.bits_per_char(), 11);
        assert_eq!(config.frame_gap(), Duration::from_nanos(4_007_500));
        assert_eq!(config.request_spacing(), Duration::from_millis(10));

        config.serial.baud_rate = 115_200;
        assert_eq!(config.frame_gap(), Duration::from_micros(1_750));

        config.frame_gap_us = Some(300);
        config.min_request_interval_ms = 0;
        assert_eq!(config.frame_gap(), Duration::from_micros(300));
        assert_eq!(config.request_spacing(), Duration::from_micros(300));
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
serial:
  port: /dev/ttyUSB0
  baud_rate: 4800
  parity: none
  stop_bits: "2"
timeout_ms: 500
retries: 1
"#;
        let config = TransportConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.serial.port, "/dev/ttyUSB0");
        assert_eq!(config.serial.baud_rate, 4800);
        assert_eq!(config.serial.data_bits, 8);
        assert_eq!(config.serial.parity, Parity::None);
        assert_eq!(config.serial.stop_bits, StopBits::Two);
        assert_eq!(config.timeout(), Duration::from_millis(500));
        assert_eq!(config.retries, 1);
        assert_eq!(config.min_request_interval_ms, 10);
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "serial:\n  port: COM3\ntimeout_ms: 250").unwrap();

        let config = TransportConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.serial.port, "COM3");
        assert_eq!(config.timeout_ms, 250);
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            TransportConfig::from_yaml("timeout_ms: 0"),
            Err(ModbusError::Config(_))
        ));
        assert!(matches!(
            TransportConfig::from_yaml("serial:\n  data_bits: 9"),
            Err(ModbusError::Config(_))
        ));
        assert!(matches!(
            TransportConfig::from_yaml("serial:\n  parity: mark"),
            Err(ModbusError::Config(_))
        ));
        assert!(matches!(
            TransportConfig::from_yaml_file("/nonexistent/matis.yaml"),
            Err(ModbusError::Io(_))
        ));
    }
}

#[cfg(test)]
mod setting_tests {
    use super::*;

    #[test]
    fn test_parse_settings() {
        assert_eq!("9600".parse::<Baudrate>().unwrap(), Baudrate::B9600);
        assert_eq!("E".parse::<Parity>().unwrap(), Parity::Even);
        assert_eq!("odd".parse::<Parity>().unwrap(), Parity::Odd);
        assert_eq!("1.5".parse::<StopBits>().unwrap(), StopBits::OnePointFive);

        assert!(matches!(
            "19200".parse::<Baudrate>(),
            Err(ModbusError::InvalidArgument(_))
        ));
        assert!(matches!("x".parse::<Parity>(), Err(ModbusError::InvalidArgument(_))));
        assert!(matches!("3".parse::<StopBits>(), Err(ModbusError::InvalidArgument(_))));
    }

    #[test]
    fn test_register_codes() {
        assert_eq!(Baudrate::B2400.register_code(), 1);
        assert_eq!(Baudrate::from_register_code(3), Some(Baudrate::B9600));
        assert_eq!(Parity::from_register_code(2), Some(Parity::Even));
        assert_eq!(StopBits::Two.register_code(), 3);
        assert_eq!(StopBits::from_register_code(0), None);
    }
}

#[cfg(test)]
mod catalog_tests {
    use super::*;

    const CATALOG: &str = r#"
registers:
  - name: voltage_phase_a
    address: 4096
    type: u16
    scale: 0.1
    access: read
  - name: energy_total
    address: 4097
    type: u32
    access: read_write
    word_order: little
  - name: delay
    address: 4099
    type: u16
    access: read_write
    min: 5
    max: 3599
"#;

    #[test]
    fn test_catalog_from_yaml() {
        let map = RegisterMap::from_yaml(CATALOG).unwrap();
        assert_eq!(map.len(), 3);

        let voltage = map.lookup("voltage_phase_a").unwrap();
        assert_eq!(voltage.address, 0x1000);
        assert_eq!(voltage.count, 1);
        assert_eq!(voltage.access, Access::Read);
        assert_eq!(voltage.decode(&[2300]).unwrap(), Value::Float(230.0));

        let energy = map.lookup("energy_total").unwrap();
        assert_eq!(energy.data_type, DataType::U32);
        assert_eq!(energy.count, 2);
        assert_eq!(energy.word_order, WordOrder::Little);

        let delay = map.lookup("delay").unwrap();
        assert_eq!((delay.min, delay.max), (Some(5), Some(3599)));
        assert_eq!(delay.scale, 1.0);
    }

    #[test]
    fn test_catalog_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(CATALOG.as_bytes()).unwrap();

        let map = RegisterMap::from_yaml_file(file.path()).unwrap();
        assert!(map.require(["voltage_phase_a", "delay"]).is_ok());
        assert!(matches!(
            map.require(["voltage_phase_a", "frequency"]),
            Err(ModbusError::UnknownField(name)) if name == "frequency"
        ));
    }

    #[test]
    fn test_invalid_catalogs() {
        let duplicate = r#"
registers:
  - {name: a, address: 1, type: u16, access: read}
  - {name: a, address: 2, type: u16, access: read}
"#;
        let wrong_count = r#"
registers:
  - {name: a, address: 1, count: 1, type: f32, access: read}
"#;
        let past_end = r#"
registers:
  - {name: a, address: 65535, type: u32, access: read}
"#;
        let bad_range = r#"
registers:
  - {name: a, address: 1, type: u16, access: read_write, min: 10, max: 5}
"#;
        let zero_scale = r#"
registers:
  - {name: a, address: 1, type: u16, access: read, scale: 0}
"#;
        for catalog in [duplicate, wrong_count, past_end, bad_range, zero_scale, "registers: 3"] {
            assert!(
                matches!(RegisterMap::from_yaml(catalog), Err(ModbusError::Config(_))),
                "accepted {}",
                catalog
            );
        }
    }
}
