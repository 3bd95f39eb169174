//! Random flight bookings for create/update requests

use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Utc};
use rand::Rng;
use serde::Serialize;
use serde_json::Value;
use vuload_core::validator::Record;

/// Fields echoed back by the booking API that must match what was sent.
pub const BOOKING_FIELDS: [&str; 14] = [
    "departure_location",
    "destination_location",
    "departure_latitude",
    "departure_longitude",
    "destination_latitude",
    "destination_longitude",
    "flight_number",
    "departure_date",
    "departure_time",
    "arrival_date",
    "arrival_time",
    "seat_number",
    "gate_number",
    "ticket_price",
];

const FLIGHT_HOURS: i64 = 2;

/// Request body of `POST /bookings` and `PUT /bookings/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Booking {
    pub departure_location: String,
    pub destination_location: String,
    pub departure_latitude: f64,
    pub departure_longitude: f64,
    pub destination_latitude: f64,
    pub destination_longitude: f64,
    pub flight_number: String,
    pub departure_date: String,
    pub departure_time: String,
    pub arrival_date: String,
    pub arrival_time: String,
    pub seat_number: String,
    pub gate_number: String,
    pub ticket_price: f64,
}

impl Booking {
    /// Bangkok to Chiang Mai, departing within a week of `today` between
    /// 06:00 and 19:59, landing two hours later.
    pub fn random<R: Rng + ?Sized>(rng: &mut R, today: NaiveDate) -> Self {
        let date = today
            .checked_add_days(Days::new(rng.gen_range(0..7)))
            .unwrap_or(today);
        let time = NaiveTime::from_hms_opt(rng.gen_range(6..20), rng.gen_range(0..60), 0)
            .unwrap_or(NaiveTime::MIN);
        let departure = NaiveDateTime::new(date, time);
        let arrival = departure + TimeDelta::hours(FLIGHT_HOURS);

        Self {
            departure_location: "Bangkok (BKK)".to_string(),
            destination_location: "Chiang Mai (CNX)".to_string(),
            departure_latitude: 13.7563,
            departure_longitude: 100.5018,
            destination_latitude: 18.7669,
            destination_longitude: 98.962,
            flight_number: flight_number(rng),
            departure_date: departure.format("%Y-%m-%d").to_string(),
            departure_time: departure.format("%H:%M:00").to_string(),
            arrival_date: arrival.format("%Y-%m-%d").to_string(),
            arrival_time: arrival.format("%H:%M:00").to_string(),
            seat_number: format!("{}{}", rng.gen_range(1..100), letter(rng, b'F')),
            gate_number: format!("{}{}", letter(rng, b'H'), rng.gen_range(1..=20)),
            ticket_price: 2500.00,
        }
    }

    /// A random booking departing from today's UTC date.
    pub fn generate() -> Self {
        Self::random(&mut rand::thread_rng(), Utc::now().date_naive())
    }

    /// The booking as a record for semantic comparison.
    pub fn to_record(&self) -> Record {
        // A struct of strings and numbers always serializes to an object.
        match serde_json::to_value(self) {
            Ok(Value::Object(record)) => record,
            _ => Record::new(),
        }
    }
}

/// Two uppercase letters and three digits, e.g. `TG123`.
fn flight_number<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!(
        "{}{}{}",
        letter(rng, b'Z'),
        letter(rng, b'Z'),
        rng.gen_range(100..1000)
    )
}

/// Uppercase letter in `A..=last`.
fn letter<R: Rng + ?Sized>(rng: &mut R, last: u8) -> char {
    char::from(rng.gen_range(b'A'..=last))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use vuload_core::validator;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, 28).unwrap()
    }

    #[test]
    fn test_generated_fields_have_expected_formats() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let booking = Booking::random(&mut rng, today());

            let flight = booking.flight_number.as_bytes();
            assert_eq!(flight.len(), 5);
            assert!(flight[..2].iter().all(u8::is_ascii_uppercase));
            let digits: u32 = booking.flight_number[2..].parse().unwrap();
            assert!((100..1000).contains(&digits));

            let date = NaiveDate::parse_from_str(&booking.departure_date, "%Y-%m-%d").unwrap();
            assert!(date >= today() && date < today() + Days::new(7));

            let time = NaiveTime::parse_from_str(&booking.departure_time, "%H:%M:%S").unwrap();
            assert!(booking.departure_time.ends_with(":00"));
            assert!((6..20).contains(&chrono::Timelike::hour(&time)));

            let (seat_row, seat_letter) = booking.seat_number.split_at(booking.seat_number.len() - 1);
            assert!((1..100).contains(&seat_row.parse::<u32>().unwrap()));
            assert!(("A"..="F").contains(&seat_letter));

            let (gate_letter, gate_no) = booking.gate_number.split_at(1);
            assert!(("A"..="H").contains(&gate_letter));
            assert!((1..=20).contains(&gate_no.parse::<u32>().unwrap()));
        }
    }

    #[test]
    fn test_arrival_is_two_hours_after_departure() {
        let mut rng = StdRng::seed_from_u64(11);
        let booking = Booking::random(&mut rng, today());

        let parse = |date: &str, time: &str| {
            NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%Y-%m-%d %H:%M:%S").unwrap()
        };
        let departure = parse(&booking.departure_date, &booking.departure_time);
        let arrival = parse(&booking.arrival_date, &booking.arrival_time);

        assert_eq!(arrival - departure, TimeDelta::hours(2));
    }

    #[test]
    fn test_record_matches_server_echo() {
        let mut rng = StdRng::seed_from_u64(3);
        let booking = Booking::random(&mut rng, today());
        let record = booking.to_record();
        assert_eq!(record.len(), BOOKING_FIELDS.len());
        assert!(BOOKING_FIELDS.iter().all(|field| record.contains_key(*field)));
        assert_eq!(record["ticket_price"], Value::from(2500.0));

        // The API stores dates as timestamps, drops seconds and returns
        // decimals as strings.
        let mut echoed = record.clone();
        echoed.insert(
            "departure_date".to_string(),
            format!("{}T00:00:00.000Z", booking.departure_date).into(),
        );
        echoed.insert("departure_time".to_string(), booking.departure_time[..5].into());
        echoed.insert("ticket_price".to_string(), "2500.00".into());
        echoed.insert("departure_latitude".to_string(), "13.7563".into());

        assert!(validator::equal(&record, Some(&echoed), &BOOKING_FIELDS));

        echoed.insert("seat_number".to_string(), "99Z".into());
        assert!(!validator::equal(&record, Some(&echoed), &BOOKING_FIELDS));
    }
}
