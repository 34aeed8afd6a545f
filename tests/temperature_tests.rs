use clevertouch::{HeatMode, TempSlot, TempUnit, Temperature};

#[test]
fn from_device_units() {
    let t = Temperature::from_device(185);
    assert_eq!(t.device(), 185);
    assert!((t.fahrenheit() - 18.5).abs() < 1e-9);
    assert!((t.celsius() - (185.0 - 320.0) / 18.0).abs() < 1e-9);
}

#[test]
fn from_celsius() {
    let t = Temperature::from_celsius(21.0);
    assert_eq!(t.device(), 698);
    assert!((t.celsius() - 21.0).abs() < 1.0 / 18.0);
}

#[test]
fn from_fahrenheit() {
    let t = Temperature::from_fahrenheit(69.84);
    assert_eq!(t.device(), 698);
    assert!((t.fahrenheit() - 69.8).abs() < 1e-9);
}

#[test]
fn device_roundtrip_is_exact() {
    for d in [-400, -1, 0, 1, 185, 320, 698, 1000, 2120] {
        let t = Temperature::new(d as f64, TempUnit::Device);
        assert_eq!(t.as_unit(TempUnit::Device), d as f64);
    }
}

#[test]
fn celsius_roundtrip_within_tolerance() {
    let mut c = 5.0;
    while c <= 30.0 {
        let t = Temperature::new(c, TempUnit::Celsius);
        assert!(
            (t.as_unit(TempUnit::Celsius) - c).abs() <= 1.0 / 18.0,
            "{c} came back as {}",
            t.celsius()
        );
        c += 0.37;
    }
}

#[test]
fn parse_units() {
    assert_eq!(Temperature::parse(21.0, "c").unwrap().device(), 698);
    assert_eq!(Temperature::parse(69.8, "f").unwrap().device(), 698);
    assert_eq!(Temperature::parse(698.0, "").unwrap().device(), 698);
    let err = Temperature::parse(21.0, "kelvin").unwrap_err();
    assert!(matches!(err, clevertouch::Error::InvalidUnit(_)));
}

#[test]
fn equality_includes_slot_and_writability() {
    let plain = Temperature::from_device(400);
    let eco = plain.for_slot(TempSlot::Eco, true);
    assert_ne!(plain, eco);
    assert_eq!(eco, Temperature::from_device(400).for_slot(TempSlot::Eco, true));
    assert_ne!(eco, Temperature::from_device(400).for_slot(TempSlot::Eco, false));
    assert_eq!(eco.name(), Some(TempSlot::Eco));
    assert!(eco.is_writable());
}

#[test]
fn display() {
    let t = Temperature::from_celsius(22.5);
    assert_eq!(format!("{t}"), "22.5\u{00b0}C");
}

#[test]
fn heat_mode_names() {
    for mode in [
        HeatMode::Comfort,
        HeatMode::Eco,
        HeatMode::Frost,
        HeatMode::Program,
        HeatMode::Boost,
        HeatMode::Off,
    ] {
        assert_eq!(HeatMode::from_name(mode.as_str()), Some(mode));
    }
    assert_eq!(HeatMode::from_name("fan"), None);
}

#[test]
fn slot_writability() {
    assert!(TempSlot::Eco.is_writable());
    assert!(TempSlot::Frost.is_writable());
    assert!(TempSlot::Comfort.is_writable());
    assert!(!TempSlot::Current.is_writable());
    assert!(!TempSlot::Boost.is_writable());
    assert!(!TempSlot::Target.is_writable());
}
