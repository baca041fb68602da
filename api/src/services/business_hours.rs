//! Business Hours
//!
//! 출금 처리는 평일 영업시간에만 가능.
//! 시간 판정은 모두 순수 함수이며 현재 시각은 `Clock` 으로 주입한다.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};

use crate::config::Config;

/// 현재 시각 공급자
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// 시스템 시계
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 고정 시계 (테스트 / 재현용)
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// 영업시간 창: 월~금, [open, close) 로컬 시각
#[derive(Debug, Clone)]
pub struct BusinessHours {
    open: NaiveTime,
    /// None = 자정까지 (close_hour 24)
    close: Option<NaiveTime>,
    offset: FixedOffset,
}

impl BusinessHours {
    pub fn new(open_hour: u32, close_hour: u32, utc_offset_minutes: i32) -> Option<Self> {
        let open = NaiveTime::from_hms_opt(open_hour, 0, 0)?;
        let close = match close_hour {
            24 => None,
            h => Some(NaiveTime::from_hms_opt(h, 0, 0)?),
        };
        let offset = FixedOffset::east_opt(utc_offset_minutes * 60)?;
        close
            .map_or(true, |c| open < c)
            .then_some(Self { open, close, offset })
    }

    fn before_close(&self, time: NaiveTime) -> bool {
        self.close.map_or(true, |c| time < c)
    }

    pub fn from_config(config: &Config) -> Option<Self> {
        Self::new(
            config.business_open_hour,
            config.business_close_hour,
            config.business_utc_offset_minutes,
        )
    }

    fn local(&self, now: DateTime<Utc>) -> DateTime<FixedOffset> {
        now.with_timezone(&self.offset)
    }

    fn is_business_day(date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    }

    /// 지금이 영업시간인지
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        let local = self.local(now);
        let time = local.time();
        Self::is_business_day(local.date_naive()) && time >= self.open && self.before_close(time)
    }

    /// 현재 로컬 날짜 이후 첫 평일 (토 → 월, 금 → 월)
    pub fn next_business_day(&self, now: DateTime<Utc>) -> NaiveDate {
        let mut date = self.local(now).date_naive() + Duration::days(1);
        while !Self::is_business_day(date) {
            date += Duration::days(1);
        }
        date
    }

    /// 출금이 처리될 날짜
    ///
    /// 평일 마감 전이면 오늘, 아니면 다음 영업일
    pub fn processing_date(&self, now: DateTime<Utc>) -> NaiveDate {
        let local = self.local(now);
        let today = local.date_naive();
        if Self::is_business_day(today) && self.before_close(local.time()) {
            today
        } else {
            self.next_business_day(now)
        }
    }

    /// 다음 영업 시작 시각 (이미 영업 중이면 now)
    pub fn next_opening(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        if self.is_open_at(now) {
            return now;
        }
        let local = self.local(now);
        let today = local.date_naive();
        let date = if Self::is_business_day(today) && local.time() < self.open {
            today
        } else {
            self.next_business_day(now)
        };
        self.offset
            .from_local_datetime(&date.and_time(self.open))
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hours() -> BusinessHours {
        BusinessHours::new(9, 16, 0).unwrap()
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    // 2024-06-08 = Saturday, 2024-06-10 = Monday, 2024-06-14 = Friday

    #[test]
    fn test_open_on_weekday_window() {
        let h = hours();
        assert!(h.is_open_at(at(2024, 6, 10, 9, 0)));
        assert!(h.is_open_at(at(2024, 6, 10, 15, 59)));
        assert!(!h.is_open_at(at(2024, 6, 10, 16, 0)));
        assert!(!h.is_open_at(at(2024, 6, 10, 8, 59)));
    }

    #[test]
    fn test_closed_on_weekend() {
        let h = hours();
        assert!(!h.is_open_at(at(2024, 6, 8, 10, 0)));
        assert!(!h.is_open_at(at(2024, 6, 9, 12, 0)));
    }

    #[test]
    fn test_next_business_day() {
        let h = hours();
        let monday = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        // Saturday → Monday
        assert_eq!(h.next_business_day(at(2024, 6, 8, 10, 0)), monday);
        // Friday → Monday
        assert_eq!(h.next_business_day(at(2024, 6, 7, 10, 0)), monday);
        // Monday → Tuesday
        assert_eq!(
            h.next_business_day(at(2024, 6, 10, 10, 0)),
            NaiveDate::from_ymd_opt(2024, 6, 11).unwrap()
        );
    }

    #[test]
    fn test_processing_date() {
        let h = hours();
        let monday = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        assert_eq!(h.processing_date(at(2024, 6, 8, 10, 0)), monday);
        assert_eq!(h.processing_date(at(2024, 6, 10, 7, 0)), monday);
        assert_eq!(h.processing_date(at(2024, 6, 10, 12, 0)), monday);
        // 금요일 마감 후 → 월요일
        assert_eq!(h.processing_date(at(2024, 6, 14, 17, 0)), NaiveDate::from_ymd_opt(2024, 6, 17).unwrap());
    }

    #[test]
    fn test_utc_offset_shifts_window() {
        // UTC+9: 로컬 09:00 = UTC 00:00
        let h = BusinessHours::new(9, 16, 9 * 60).unwrap();
        assert!(h.is_open_at(at(2024, 6, 10, 0, 30)));
        assert!(!h.is_open_at(at(2024, 6, 10, 8, 0)));
    }

    #[test]
    fn test_next_opening() {
        let h = hours();
        assert_eq!(h.next_opening(at(2024, 6, 8, 10, 0)), at(2024, 6, 10, 9, 0));
        assert_eq!(h.next_opening(at(2024, 6, 10, 7, 0)), at(2024, 6, 10, 9, 0));
        let open = at(2024, 6, 10, 11, 0);
        assert_eq!(h.next_opening(open), open);
    }

    #[test]
    fn test_invalid_window() {
        assert!(BusinessHours::new(16, 9, 0).is_none());
        assert!(BusinessHours::new(25, 26, 0).is_none());
        assert!(BusinessHours::new(9, 25, 0).is_none());
        assert!(BusinessHours::new(24, 24, 0).is_none());
    }

    #[test]
    fn test_close_at_midnight_covers_last_second() {
        let h = BusinessHours::new(9, 24, 0).unwrap();
        let last_second = Utc.with_ymd_and_hms(2024, 6, 10, 23, 59, 59).unwrap();
        assert!(h.is_open_at(last_second));
        assert_eq!(
            h.processing_date(last_second),
            NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
        );
        // 자정 이후는 다음 날 창
        assert!(!h.is_open_at(at(2024, 6, 11, 0, 0)));
        assert_eq!(h.next_opening(at(2024, 6, 11, 0, 0)), at(2024, 6, 11, 9, 0));
    }
}
