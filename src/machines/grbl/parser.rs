//! Pure parsing for GRBL-HAL responses.
//!
//! No async, no I/O — only string/line parsing. [`parse_response`] is the
//! total classifier (C2): every non-empty line maps to exactly one
//! [`Response`] variant, falling back to `Unknown` rather than failing. The
//! lower-level `parse_*` helpers can fail on malformed contents of an
//! already-recognized line; `parse_response` catches those and degrades to
//! `Unknown` rather than propagating, since classification itself must be
//! infallible.

use super::state::*;
use std::collections::HashMap;
use std::time::Instant;
use thiserror::Error;

/// Errors produced when parsing the *contents* of an already-recognized
/// GRBL-HAL response line.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid status line: {0}")]
    InvalidStatus(String),
    #[error("invalid position: {0}")]
    InvalidPosition(String),
    #[error("invalid settings line: {0}")]
    InvalidSettingsLine(String),
    #[error("invalid alarm message: {0}")]
    InvalidAlarm(String),
    #[error("invalid coordinate line: {0}")]
    InvalidCoordinate(String),
}

/// A single classified inbound line (C2 data model). Classification is
/// total: every non-empty line produces exactly one variant, `Unknown` being
/// the catch-all.
#[derive(Clone, Debug, PartialEq)]
pub enum Response {
    Ok,
    Error { code: u8 },
    Alarm { code: AlarmCode },
    Status(MachineStatus),
    Setting { index: u32, value: String },
    Coordinates { system: CoordinateRecord, offset: Position },
    Welcome { firmware: String },
    Unknown { raw: String },
}

/// Which bracketed coordinate record a `Coordinates` response carries.
/// `Wcs(n)` is one of `G54..G59.3` (`n` is the `CoordSystem` selector 1..=9);
/// the others are GRBL's fixed single-purpose coordinate reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoordinateRecord {
    Wcs(u8),
    G28,
    G30,
    G92,
    ToolLengthOffset,
    Probe,
}

/// Parses any inbound line into a [`Response`]. Total: never fails. Applies
/// the rules in order; the first match wins.
pub fn parse_response(line: &str) -> Response {
    let trimmed = line.trim();

    if trimmed.is_empty() {
        return Response::Unknown { raw: line.to_string() };
    }

    if looks_like_status(trimmed) {
        if let Ok(status) = parse_status(trimmed, Instant::now()) {
            return Response::Status(status);
        }
        return Response::Unknown { raw: line.to_string() };
    }

    if trimmed.eq_ignore_ascii_case("ok") {
        return Response::Ok;
    }

    if let Some(rest) = trimmed.strip_prefix("error:") {
        if let Ok(code) = rest.trim().parse::<u8>() {
            return Response::Error { code };
        }
    }

    if let Some(code) = try_parse_alarm_prefix(trimmed) {
        return Response::Alarm { code: AlarmCode::from(code) };
    }

    if trimmed.starts_with('$') && trimmed.contains('=') {
        if let Some((index, value)) = parse_setting_line(trimmed) {
            return Response::Setting { index, value };
        }
    }

    if trimmed.starts_with('[') && trimmed.ends_with(']') {
        if let Some((system, offset)) = parse_coordinate_line(trimmed) {
            return Response::Coordinates { system, offset };
        }
    }

    if trimmed.starts_with("Grbl ") {
        return Response::Welcome { firmware: trimmed.to_string() };
    }

    Response::Unknown { raw: line.to_string() }
}

/// True only for lines matching the documented wire grammar
/// `"<" state (...)* ">"` — the leading `<` is required, not inferred from
/// the state token, so an unrelated line that happens to start with a
/// recognized state word is never misclassified as a status report.
fn looks_like_status(s: &str) -> bool {
    s.starts_with('<') && s.ends_with('>')
}

fn try_parse_alarm_prefix(s: &str) -> Option<u8> {
    let rest = s
        .strip_prefix("ALARM:")
        .or_else(|| s.strip_prefix("Alarm:"))
        .or_else(|| s.strip_prefix("alarm:"))?;
    rest.trim().parse::<u8>().ok()
}

fn parse_setting_line(s: &str) -> Option<(u32, String)> {
    let rest = s.strip_prefix('$')?;
    let (num_str, value) = rest.split_once('=')?;
    let index = num_str.trim().parse::<u32>().ok()?;
    Some((index, value.trim().to_string()))
}

/// Parses `[G54:x,y,z]`, `[G28:...]`, `[G30:...]`, `[G92:...]`, `[TLO:...]`,
/// `[PRB:x,y,z:1]` into a coordinate record + position.
fn parse_coordinate_line(s: &str) -> Option<(CoordinateRecord, Position)> {
    let inner = &s[1..s.len() - 1];
    let (tag, rest) = inner.split_once(':')?;
    let tag = tag.trim();

    let record = if let Some(n) = tag.strip_prefix('G').and_then(|s| parse_wcs_tag(s)) {
        CoordinateRecord::Wcs(n)
    } else {
        match tag {
            "G28" => CoordinateRecord::G28,
            "G30" => CoordinateRecord::G30,
            "G92" => CoordinateRecord::G92,
            "TLO" => CoordinateRecord::ToolLengthOffset,
            "PRB" => CoordinateRecord::Probe,
            _ => return None,
        }
    };

    // PRB carries a trailing ":1"/":0" success flag; only the position matters here.
    let pos_part = rest.split(':').next().unwrap_or(rest);
    let position = parse_position(pos_part).ok()?;
    Some((record, position))
}

fn parse_wcs_tag(s: &str) -> Option<u8> {
    match s {
        "54" => Some(1),
        "55" => Some(2),
        "56" => Some(3),
        "57" => Some(4),
        "58" => Some(5),
        "59" => Some(6),
        "59.1" => Some(7),
        "59.2" => Some(8),
        "59.3" => Some(9),
        _ => None,
    }
}

/// Parses a single real-time status line (response to `?`).
///
/// Input format: `<State|MPos:x,y,z[,a]|WPos:x,y,z[,a]|FS:feed,spindle>`
/// Angle brackets are optional. GRBL-HAL uses comma-separated FS: feed,spindle.
///
/// Caller provides `last_updated` (e.g. `Instant::now()`) so the poller can
/// set the exact receive time.
pub fn parse_status(line: &str, last_updated: Instant) -> Result<MachineStatus, ParseError> {
    let s = line.trim();
    // Strip optional angle brackets.
    let s = s.strip_prefix('<').unwrap_or(s).strip_suffix('>').unwrap_or(s);
    let parts: Vec<&str> = s.split('|').collect();
    let state_token = parts.first().map(|p| p.trim()).unwrap_or("");
    if state_token.is_empty() {
        return Err(ParseError::InvalidStatus("empty status".into()));
    }

    let state = parse_state(state_token)?;
    let mut machine_pos = Position::ZERO;
    let mut work_pos = Position::ZERO;
    let mut feed_rate = 0.0_f64;
    let mut spindle_speed = 0.0_f64;
    let mut input_pins = PinState::default();
    let mut wco = None;
    let mut overrides = None;
    let mut buffer = None;

    for part in parts.iter().skip(1) {
        let part = part.trim();
        if let Some(pos_str) = part.strip_prefix("MPos:") {
            machine_pos = parse_position(pos_str)?;
        } else if let Some(pos_str) = part.strip_prefix("WPos:") {
            work_pos = parse_position(pos_str)?;
        } else if let Some(fs_str) = part.strip_prefix("FS:") {
            let (feed, spindle) = parse_fs(fs_str)?;
            feed_rate = feed;
            spindle_speed = spindle;
        } else if let Some(pn_str) = part.strip_prefix("Pn:") {
            input_pins = parse_pin_state(pn_str);
        } else if let Some(pos_str) = part.strip_prefix("WCO:") {
            wco = Some(parse_position(pos_str)?);
        } else if let Some(ov_str) = part.strip_prefix("Ov:") {
            overrides = Some(parse_overrides(ov_str)?);
        } else if let Some(bf_str) = part.strip_prefix("Bf:") {
            buffer = Some(parse_buffer_state(bf_str)?);
        }
        // Unrecognized keys (e.g. `Ln:`, `A:`) are ignored rather than rejected.
    }

    Ok(MachineStatus {
        state,
        machine_pos,
        work_pos,
        feed_rate,
        spindle_speed,
        input_pins,
        wco,
        overrides,
        buffer,
        last_updated,
    })
}

/// Parses the state token (first segment). GRBL-HAL states: Idle, Run, Hold,
/// Jog, Alarm, Door, Check, Home, Sleep.
fn parse_state(s: &str) -> Result<MachineState, ParseError> {
    let s = s.trim();
    // Substate after ':', e.g. "Hold:0" or "Alarm:1".
    let (base, rest) = match s.find(':') {
        Some(i) => (&s[..i], Some(&s[i + 1..])),
        None => (s, None),
    };
    let base = base.trim();
    match base {
        "Idle" => Ok(MachineState::Idle),
        "Run" => Ok(MachineState::Run),
        "Hold" => Ok(MachineState::Hold(HoldReason::FeedHold)),
        "Jog" => Ok(MachineState::Jog),
        "Alarm" => {
            let code = rest
                .and_then(|r| r.trim().parse::<u8>().ok())
                .map(AlarmCode::from)
                .unwrap_or(AlarmCode::Unknown(0));
            Ok(MachineState::Alarm(code))
        }
        "Door" => Ok(MachineState::Door),
        "Check" => Ok(MachineState::Check),
        "Home" => Ok(MachineState::Home),
        "Sleep" => Ok(MachineState::Sleep),
        _ => Ok(MachineState::Unknown(s.to_string())),
    }
}

/// Parses "x,y,z" or "x,y,z,a" into Position.
fn parse_position(s: &str) -> Result<Position, ParseError> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() < 3 {
        return Err(ParseError::InvalidPosition(format!(
            "expected at least x,y,z, got: {}",
            s
        )));
    }
    let x: f64 = parts[0]
        .parse()
        .map_err(|_| ParseError::InvalidPosition(format!("invalid x: {}", parts[0])))?;
    let y: f64 = parts[1]
        .parse()
        .map_err(|_| ParseError::InvalidPosition(format!("invalid y: {}", parts[1])))?;
    let z: f64 = parts[2]
        .parse()
        .map_err(|_| ParseError::InvalidPosition(format!("invalid z: {}", parts[2])))?;
    let a = parts.get(3).and_then(|s| s.parse().ok());
    Ok(Position { x, y, z, a })
}

/// Parses "feed,spindle" (GRBL-HAL FS field).
fn parse_fs(s: &str) -> Result<(f64, f64), ParseError> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() < 2 {
        return Err(ParseError::InvalidStatus(format!(
            "FS expected feed,spindle: {}",
            s
        )));
    }
    let feed: f64 = parts[0]
        .parse()
        .map_err(|_| ParseError::InvalidStatus(format!("invalid feed: {}", parts[0])))?;
    let spindle: f64 = parts[1]
        .parse()
        .map_err(|_| ParseError::InvalidStatus(format!("invalid spindle: {}", parts[1])))?;
    Ok((feed, spindle))
}

/// Parses "feed,rapid,spindle" (GRBL-HAL `Ov:` override-percentage field).
fn parse_overrides(s: &str) -> Result<Overrides, ParseError> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() < 3 {
        return Err(ParseError::InvalidStatus(format!(
            "Ov expected feed,rapid,spindle: {}",
            s
        )));
    }
    let parse_pct = |p: &str| {
        p.parse::<u16>()
            .map_err(|_| ParseError::InvalidStatus(format!("invalid override percentage: {}", p)))
    };
    Ok(Overrides {
        feed_pct: parse_pct(parts[0])?,
        rapid_pct: parse_pct(parts[1])?,
        spindle_pct: parse_pct(parts[2])?,
    })
}

/// Parses "planner,rx" (GRBL-HAL `Bf:` buffer-state field).
fn parse_buffer_state(s: &str) -> Result<BufferState, ParseError> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() < 2 {
        return Err(ParseError::InvalidStatus(format!("Bf expected planner,rx: {}", s)));
    }
    let planner_blocks: u32 = parts[0]
        .parse()
        .map_err(|_| ParseError::InvalidStatus(format!("invalid planner block count: {}", parts[0])))?;
    let rx_bytes: u32 = parts[1]
        .parse()
        .map_err(|_| ParseError::InvalidStatus(format!("invalid rx byte count: {}", parts[1])))?;
    Ok(BufferState { planner_blocks, rx_bytes })
}

/// Parses the `Pn:` pin-state field, e.g. `Pn:XYZPD`.
fn parse_pin_state(s: &str) -> PinState {
    let mut pins = PinState::default();
    for c in s.chars() {
        match c {
            'X' => pins.limit_x = true,
            'Y' => pins.limit_y = true,
            'Z' => pins.limit_z = true,
            'P' => pins.probe = true,
            'D' => pins.door = true,
            'H' => pins.hold = true,
            _ => {}
        }
    }
    pins
}

/// Parses an alarm message string into an alarm code.
///
/// GRBL-HAL typically sends "ALARM:n" or "error:n". Accepts a line that
/// contains a numeric alarm code (e.g. after "ALARM:" or "error:").
pub fn parse_alarm_code(s: &str) -> Result<AlarmCode, ParseError> {
    let s = s.trim();
    let num_str = s
        .strip_prefix("ALARM:")
        .or_else(|| s.strip_prefix("ALARM: "))
        .or_else(|| s.strip_prefix("error:"))
        .or_else(|| s.strip_prefix("error: "))
        .map(str::trim)
        .unwrap_or(s);
    let n: u8 = num_str
        .parse()
        .map_err(|_| ParseError::InvalidAlarm(s.to_string()))?;
    Ok(AlarmCode::from(n))
}

/// Parsed settings from a `$$` response: setting number -> value string.
/// Values are kept as strings; callers may interpret as int/float/bool as needed.
#[derive(Clone, Debug, Default)]
pub struct GrblSettings {
    pub raw: HashMap<u32, String>,
}

/// Parses the lines of a `$$` settings response.
///
/// Each line should be `$N=value`. Empty lines and a trailing `ok` are
/// skipped. Malformed lines are skipped (no error) so we tolerate
/// occasional garbage; for strict parsing we could return ParseError instead.
pub fn parse_settings(lines: &str) -> Result<GrblSettings, ParseError> {
    let mut raw = HashMap::new();
    for line in lines.lines() {
        let line = line.trim();
        if line.is_empty() || line.eq_ignore_ascii_case("ok") {
            continue;
        }
        if let Some((n, value)) = parse_setting_line(line) {
            raw.insert(n, value);
        }
    }
    Ok(GrblSettings { raw })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_parse_status_idle_bare() {
        let line = "Idle|MPos:0,0,0|WPos:0,0,0|FS:0,0";
        let t = Instant::now();
        let st = parse_status(line, t).unwrap();
        assert!(matches!(st.state, MachineState::Idle));
        assert_eq!(st.machine_pos.x, 0.0);
        assert_eq!(st.work_pos.z, 0.0);
        assert_eq!(st.feed_rate, 0.0);
        assert_eq!(st.spindle_speed, 0.0);
    }

    #[test]
    fn test_parse_status_with_angle_brackets() {
        let line = "<Idle|MPos:0.000,0.000,0.000|WPos:0.000,0.000,0.000|FS:0,0>";
        let t = Instant::now();
        let st = parse_status(line, t).unwrap();
        assert!(matches!(st.state, MachineState::Idle));
        assert_eq!(st.machine_pos.x, 0.0);
    }

    #[test]
    fn test_parse_status_with_fourth_axis() {
        let line = "Idle|MPos:0,0,0,0|WPos:0,0,0,0|FS:100,500";
        let t = Instant::now();
        let st = parse_status(line, t).unwrap();
        assert_eq!(st.machine_pos.a, Some(0.0));
        assert_eq!(st.work_pos.a, Some(0.0));
        assert_eq!(st.feed_rate, 100.0);
        assert_eq!(st.spindle_speed, 500.0);
    }

    #[test]
    fn test_parse_status_pin_state() {
        let line = "Alarm|MPos:0,0,0|WPos:0,0,0|FS:0,0|Pn:XYPD";
        let st = parse_status(line, Instant::now()).unwrap();
        assert!(st.input_pins.limit_x);
        assert!(st.input_pins.limit_y);
        assert!(!st.input_pins.limit_z);
        assert!(st.input_pins.probe);
        assert!(st.input_pins.door);
    }

    #[test]
    fn test_parse_status_wco_ov_bf() {
        let line = "Idle|MPos:1,2,3|WPos:0,0,0|FS:0,0|WCO:1,2,3|Ov:100,100,80|Bf:15,128";
        let st = parse_status(line, Instant::now()).unwrap();
        assert_eq!(st.wco, Some(Position { x: 1.0, y: 2.0, z: 3.0, a: None }));
        let ov = st.overrides.unwrap();
        assert_eq!((ov.feed_pct, ov.rapid_pct, ov.spindle_pct), (100, 100, 80));
        let bf = st.buffer.unwrap();
        assert_eq!((bf.planner_blocks, bf.rx_bytes), (15, 128));
    }

    #[test]
    fn test_parse_status_invalid_empty() {
        let t = Instant::now();
        let err = parse_status("", t).unwrap_err();
        assert!(matches!(err, ParseError::InvalidStatus(_)));
    }

    #[test]
    fn test_parse_status_invalid_position() {
        let t = Instant::now();
        let err = parse_status("Idle|MPos:bad,0,0|WPos:0,0,0|FS:0,0", t).unwrap_err();
        assert!(matches!(err, ParseError::InvalidPosition(_)));
    }

    #[test]
    fn test_parse_alarm_code_alarm_prefix() {
        let code = parse_alarm_code("ALARM:1").unwrap();
        assert_eq!(code, AlarmCode::HardLimit);
    }

    #[test]
    fn test_parse_settings() {
        let lines = "$0=10\n$1=25\n$21=0\nok\n";
        let settings = parse_settings(lines).unwrap();
        assert_eq!(settings.raw.get(&0), Some(&"10".to_string()));
        assert_eq!(settings.raw.get(&1), Some(&"25".to_string()));
        assert_eq!(settings.raw.get(&21), Some(&"0".to_string()));
        assert!(!settings.raw.contains_key(&99));
    }

    // --- parse_response: total classifier (I6, C2) ---

    #[test]
    fn test_parse_response_ok() {
        assert_eq!(parse_response("ok"), Response::Ok);
    }

    #[test]
    fn test_parse_response_error() {
        assert_eq!(parse_response("error:1"), Response::Error { code: 1 });
    }

    #[test]
    fn test_parse_response_alarm() {
        assert_eq!(
            parse_response("ALARM:2"),
            Response::Alarm { code: AlarmCode::SoftLimit }
        );
    }

    #[test]
    fn test_parse_response_status() {
        match parse_response("<Idle|MPos:0,0,0|WPos:0,0,0|FS:0,0>") {
            Response::Status(status) => assert!(matches!(status.state, MachineState::Idle)),
            other => panic!("expected Status, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_response_setting() {
        assert_eq!(
            parse_response("$100=115200"),
            Response::Setting { index: 100, value: "115200".to_string() }
        );
    }

    #[test]
    fn test_parse_response_coordinates_wcs() {
        match parse_response("[G54:1.000,2.000,3.000]") {
            Response::Coordinates { system, offset } => {
                assert_eq!(system, CoordinateRecord::Wcs(1));
                assert_eq!(offset.x, 1.0);
                assert_eq!(offset.y, 2.0);
                assert_eq!(offset.z, 3.0);
            }
            other => panic!("expected Coordinates, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_response_coordinates_probe_with_success_flag() {
        match parse_response("[PRB:1.000,2.000,3.000:1]") {
            Response::Coordinates { system, offset } => {
                assert_eq!(system, CoordinateRecord::Probe);
                assert_eq!(offset.z, 3.0);
            }
            other => panic!("expected Coordinates, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_response_welcome() {
        assert_eq!(
            parse_response("Grbl 1.1h ['$' for help]"),
            Response::Welcome { firmware: "Grbl 1.1h ['$' for help]".to_string() }
        );
    }

    #[test]
    fn test_parse_response_unknown() {
        assert_eq!(
            parse_response("[MSG:Reset to continue]"),
            Response::Unknown { raw: "[MSG:Reset to continue]".to_string() }
        );
    }

    #[test]
    fn test_parse_response_empty_line_is_unknown() {
        assert_eq!(parse_response(""), Response::Unknown { raw: "".to_string() });
    }

    #[test]
    fn test_parse_response_malformed_status_degrades_to_unknown() {
        // Recognized as a status line by its state token, but the position
        // fields are garbage; classification must not fail (I6).
        let raw = "Idle|MPos:garbage|WPos:0,0,0|FS:0,0";
        assert_eq!(parse_response(raw), Response::Unknown { raw: raw.to_string() });
    }
}
