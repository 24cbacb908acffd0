mod common;

use std::time::Duration;

use common::FakeDevice;
use matis_modbus::mt53r::{
    Command, CommandOutput, DisplayStatus, Field, HARDWARE_ID, HandleLocation, Model, Mt53r,
    RecloseStatus, SerialSettings, register_map,
};
use matis_modbus::{Access, Baudrate, ModbusError, Parity, StopBits, Value};

fn recloser(fake: &FakeDevice) -> Mt53r<&FakeDevice> {
    Mt53r::new(fake, 1).unwrap()
}

#[cfg(test)]
mod catalog_tests {
    use super::*;

    #[test]
    fn test_register_map_complete() {
        let map = register_map().unwrap();
        assert_eq!(map.len(), Field::all().count());
        assert_eq!(map.len(), 57);

        for field in Field::all() {
            let descriptor = map.lookup(&field.name()).unwrap();
            assert_eq!(descriptor, &field.descriptor());
        }
    }

    #[test]
    fn test_fields_in_address_order() {
        let addresses: Vec<u16> = Field::all().map(|f| f.descriptor().address).collect();
        assert!(addresses.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_catalog_entries() {
        let map = register_map().unwrap();

        let control = map.lookup("control").unwrap();
        assert_eq!(control.address, 0x11);
        assert_eq!(control.access, Access::ReadWrite);

        assert_eq!(map.lookup("system_clock").unwrap().count, 2);
        assert_eq!(map.lookup("hardware_id").unwrap().access, Access::Read);
        assert_eq!(map.lookup("ar_wait_time_1").unwrap().address, 0x32);
        assert_eq!(map.lookup("ar_wait_time_10").unwrap().address, 0x3B);
        assert_eq!(map.lookup("ar_stable_time_1").unwrap().address, 0x3C);
        assert_eq!(map.lookup("ar_stable_time_10").unwrap().address, 0x45);
        assert!(map.lookup("ar_wait_time_11").is_err());
    }

    #[test]
    fn test_attempt_fields_checked() {
        assert_eq!(Field::reclose_wait_time(3).unwrap(), Field::RecloseWaitTime(3));
        assert!(matches!(
            Field::reclose_wait_time(0),
            Err(ModbusError::InvalidArgument(_))
        ));
        assert!(matches!(
            Field::reclose_stable_time(11),
            Err(ModbusError::InvalidArgument(_))
        ));
        assert_eq!(Field::RecloseStableTime(4).to_string(), "ar_stable_time_4");
    }
}

#[cfg(test)]
mod command_tests {
    use super::*;

    #[test]
    fn test_breaker_commands() {
        let fake = FakeDevice::new();
        let device = recloser(&fake);

        device.open_breaker().unwrap();
        assert_eq!(fake.get(0x11), 1);
        device.close_breaker().unwrap();
        assert_eq!(fake.get(0x11), 2);
        device.lock_breaker().unwrap();
        assert_eq!(fake.get(0x11), 3);
        device.unlock_breaker().unwrap();
        assert_eq!(fake.get(0x11), 4);

        let requests = fake.requests();
        assert_eq!(requests[0].function_code, 0x06);
        assert_eq!(requests[0].data, vec![0x00, 0x11, 0x00, 0x01]);
    }

    #[test]
    fn test_reset() {
        let fake = FakeDevice::new();

        recloser(&fake).reset().unwrap();
        assert_eq!(fake.requests()[0].data, vec![0x00, 0x04, 0x07, 0xE4]);
    }

    #[test]
    fn test_reclose_timing() {
        let fake = FakeDevice::new();
        let device = recloser(&fake);

        device.set_reclose_wait_time(3, 60).unwrap();
        assert_eq!(fake.get(0x34), 60);
        device.set_reclose_stable_time(10, 120).unwrap();
        assert_eq!(fake.get(0x45), 120);

        assert!(matches!(
            device.set_reclose_wait_time(0, 60),
            Err(ModbusError::InvalidArgument(_))
        ));
        assert!(matches!(
            device.set_reclose_stable_time(11, 60),
            Err(ModbusError::InvalidArgument(_))
        ));
        assert!(matches!(
            device.set_reclose_wait_time(1, 4),
            Err(ModbusError::Range { .. })
        ));
        assert_eq!(fake.requests().len(), 2);
    }

    #[test]
    fn test_reclose_settings() {
        let fake = FakeDevice::new();
        let device = recloser(&fake);

        device.set_reclose_attempts(4).unwrap();
        assert_eq!(fake.get(0x13), 4);
        assert!(matches!(
            device.set_reclose_attempts(11),
            Err(ModbusError::Range { .. })
        ));

        device.set_reclose_enabled(true).unwrap();
        assert_eq!(fake.get(0x0A), 1);
    }

    #[test]
    fn test_set_device_address_follows_device() {
        let fake = FakeDevice::new();
        let mut device = recloser(&fake);

        device.set_device_address(5).unwrap();
        assert_eq!(fake.get(0x00), 5);
        assert_eq!(device.device().unit_id(), 5);

        device.hardware_id().unwrap();
        let requests = fake.requests();
        assert_eq!(requests[0].unit_id, 1);
        assert_eq!(requests[1].unit_id, 5);
    }

    #[test]
    fn test_serial_config() {
        let fake = FakeDevice::new();
        fake.set(0x01, 3);
        fake.set(0x02, 1);
        fake.set(0x03, 1);
        let device = recloser(&fake);

        let settings = device.serial_config().unwrap();
        assert_eq!(
            settings,
            SerialSettings {
                baudrate: Baudrate::B9600,
                parity: Parity::None,
                stop_bits: StopBits::One,
            }
        );
        assert_eq!(settings.to_string(), "9600 N 1");
        assert_eq!(fake.requests().len(), 1);

        device
            .set_serial_config(&SerialSettings {
                baudrate: Baudrate::B2400,
                parity: Parity::Even,
                stop_bits: StopBits::Two,
            })
            .unwrap();
        assert_eq!((fake.get(0x01), fake.get(0x02), fake.get(0x03)), (1, 2, 3));
    }

    #[test]
    fn test_serial_config_unknown_code() {
        let fake = FakeDevice::new();
        fake.set(0x01, 9);
        fake.set(0x02, 1);
        fake.set(0x03, 1);

        assert!(matches!(
            recloser(&fake).serial_config(),
            Err(ModbusError::Decoding { .. })
        ));
    }

    #[test]
    fn test_status_registers() {
        let fake = FakeDevice::new();
        fake.set(0x06, 2); // hours
        fake.set(0x07, 30); // seconds
        fake.set(0x08, HARDWARE_ID);
        fake.set(0x0C, 5);
        fake.set(0x0F, 0x0005);
        fake.set(0x10, 0x8000);
        let device = recloser(&fake);

        assert_eq!(device.uptime().unwrap(), Duration::from_secs(2 * 3600 + 30));
        assert_eq!(device.hardware_id().unwrap(), HARDWARE_ID);
        assert_eq!(device.display_status().unwrap(), DisplayStatus::GreenFlash);

        let handle = device.handle_location().unwrap();
        assert!(handle.contains(HandleLocation::OPEN));
        assert!(handle.contains(HandleLocation::CLOSED));
        assert!(!handle.contains(HandleLocation::MOTOR_FAULT));

        let status = device.reclose_status().unwrap();
        assert!(status.contains(RecloseStatus::PADLOCKED));
        assert!(!status.is_initial());
    }

    #[test]
    fn test_read_only_fields_rejected() {
        let fake = FakeDevice::new();
        let device = recloser(&fake);

        assert!(matches!(
            device.set(Field::HardwareId, 1),
            Err(ModbusError::AccessDenied { .. })
        ));
        assert!(fake.requests().is_empty());
    }

    #[test]
    fn test_fetch_in_one_transaction() {
        let fake = FakeDevice::new();
        fake.set(0x08, HARDWARE_ID);
        fake.set(0x3C, 300);

        let status = recloser(&fake).fetch().unwrap();

        assert_eq!(status.len(), 57);
        assert!(status.contains(&(Field::HardwareId, Value::Int(HARDWARE_ID as i64))));
        assert!(status.contains(&(Field::RecloseStableTime(1), Value::Int(300))));
        assert!(status.contains(&(Field::RecloseEnable, Value::Bool(false))));

        let requests = fake.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].data, vec![0x00, 0x00, 0x00, 0x46]);
    }
}

#[cfg(test)]
mod shell_tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!("status".parse::<Command>().unwrap(), Command::Status);
        assert_eq!("  open ".parse::<Command>().unwrap(), Command::Open);
        assert_eq!(
            "set_auto_reclose_wait_time 3 60".parse::<Command>().unwrap(),
            Command::SetRecloseWaitTime {
                attempt: 3,
                seconds: 60
            }
        );
        assert_eq!(
            "set_serial_config 4800 e 2".parse::<Command>().unwrap(),
            Command::SetSerialConfig(SerialSettings {
                baudrate: Baudrate::B4800,
                parity: Parity::Even,
                stop_bits: StopBits::Two,
            })
        );
        assert_eq!(
            "set_device_address 17".parse::<Command>().unwrap(),
            Command::SetDeviceAddress(17)
        );
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        for line in [
            "",
            "frobnicate",
            "open now",
            "set_device_address",
            "set_device_address 300",
            "set_serial_config 115200 e 1",
            "set_auto_reclose_wait_time 3",
        ] {
            assert!(
                matches!(line.parse::<Command>(), Err(ModbusError::InvalidArgument(_))),
                "accepted {:?}",
                line
            );
        }
    }

    #[test]
    fn test_names_parse() {
        for name in Command::NAMES {
            let result = name.parse::<Command>();
            assert!(
                !matches!(&result, Err(ModbusError::InvalidArgument(msg)) if msg.starts_with("Unknown command")),
                "{} not recognised",
                name
            );
        }
    }

    #[test]
    fn test_execute() {
        let fake = FakeDevice::new();
        fake.set(0x00, 1);
        fake.set(0x06, 1);
        let mut device = recloser(&fake);

        assert_eq!(
            Command::DeviceAddress.execute(&mut device).unwrap(),
            CommandOutput::Address(1)
        );
        assert_eq!(
            Command::Uptime.execute(&mut device).unwrap(),
            CommandOutput::Uptime(Duration::from_secs(3600))
        );
        assert_eq!(Command::Lock.execute(&mut device).unwrap(), CommandOutput::Done);
        assert_eq!(fake.get(0x11), 3);

        match Command::Status.execute(&mut device).unwrap() {
            CommandOutput::Status(fields) => assert_eq!(fields.len(), 57),
            other => panic!("unexpected output {:?}", other),
        }
    }
}

#[cfg(test)]
mod identify_tests {
    use super::*;

    #[test]
    fn test_connect_known_model() {
        let fake = FakeDevice::new();
        fake.set(0x08, HARDWARE_ID);

        let device = Mt53r::connect(&fake, 3).unwrap();
        assert_eq!(device.device().unit_id(), 3);

        let requests = fake.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].unit_id, 3);
        assert_eq!(requests[0].data, vec![0x00, 0x08, 0x00, 0x01]);
    }

    #[test]
    fn test_connect_unknown_model() {
        let fake = FakeDevice::new();
        fake.set(0x08, 999);

        assert!(matches!(
            Mt53r::connect(&fake, 1),
            Err(ModbusError::UnknownModel(999))
        ));
    }

    #[test]
    fn test_model_from_hardware_id() {
        assert_eq!(Model::from_hardware_id(523).unwrap(), Model::Mt53r);
        assert_eq!(Model::Mt53r.hardware_id(), HARDWARE_ID);
        assert_eq!(Model::Mt53r.to_string(), "MT53RA-sx");

        let err = Model::from_hardware_id(0).unwrap_err();
        assert!(matches!(err, ModbusError::UnknownModel(0)));
        assert!(!err.is_retryable());
    }
}
