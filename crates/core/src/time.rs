use chrono::{DateTime, Utc};

/// Jaeger Thrift timestamps are microseconds since the Unix epoch.
pub fn micros_to_dt(micros: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_micros(micros)
}

pub fn dt_to_micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

pub fn dt_to_nanos(ts: DateTime<Utc>) -> u64 {
    ts.timestamp_nanos_opt()
        .and_then(|n| u64::try_from(n).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn micros_round_trip() {
        let ts = micros_to_dt(1_542_158_650_536_343).unwrap();
        assert_eq!(ts.to_rfc3339(), "2018-11-14T01:24:10.536343+00:00");
        assert_eq!(dt_to_micros(ts), 1_542_158_650_536_343);
        assert_eq!(dt_to_nanos(ts), 1_542_158_650_536_343_000);
    }

    #[test]
    fn rejects_out_of_range_micros() {
        assert!(micros_to_dt(i64::MAX).is_none());
    }
}
