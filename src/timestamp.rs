/// Formats seconds as `HH:MM:SS.mmm`, widening the hour field past 99.
pub fn time_str(sec: f64) -> String {
    let ms = (sec * 1000f64).max(0.0) as u64;
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1000;
    let milliseconds = ms % 1000;

    format!(
        "{hours:0width$}:{minutes:02}:{seconds:02}.{milliseconds:03}",
        width = if hours >= 100 { 0 } else { 2 }
    )
}

#[test]
fn formats_clock_times() {
    assert_eq!(time_str(0.0), "00:00:00.000");
    assert_eq!(time_str(2.5), "00:00:02.500");
    assert_eq!(time_str(3723.5), "01:02:03.500");
    assert_eq!(time_str(360_000.0), "100:00:00.000");
}
