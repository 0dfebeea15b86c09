//! Чистое форматирование прогнозов в текст сообщений.

use crate::weather::{CurrentConditions, DailyEntry, ForecastSlot, Location};

/// Ссылка на иконку погодных условий у провайдера.
pub fn icon_url(icon: &str) -> String {
    format!("https://openweathermap.org/img/wn/{icon}@4x.png")
}

/// Название места для показа пользователю: берём то, что вернул провайдер,
/// иначе то, что запрашивали.
pub fn city_label(requested: &Location, current: &CurrentConditions) -> String {
    if current.city_label.trim().is_empty() {
        requested.to_string()
    } else {
        current.city_label.clone()
    }
}

/// Подпись к карточке текущей погоды.
pub fn current_caption(city: &str, current: &CurrentConditions) -> String {
    format!(
        "Погода в {}\nТемпература: {:.0}°C\nОщущается как: {:.0}°C\nВлажность: {}%\nВетер: {:.1} м/с",
        city, current.temperature, current.feels_like, current.humidity, current.wind_speed
    )
}

/// Почасовой прогноз: строка на каждый шаг.
pub fn hourly_text(slots: &[ForecastSlot]) -> String {
    let mut out = String::from("Почасовой прогноз:\n");
    for slot in slots {
        out.push_str(&format!(
            "{} → {:.0}°C\n",
            slot.time.format("%H:%M"),
            slot.temperature
        ));
    }
    out
}

/// Недельный прогноз: строка на каждый день.
pub fn weekly_text(entries: &[DailyEntry]) -> String {
    let mut out = String::from("Недельный прогноз:\n");
    for entry in entries {
        out.push_str(&format!(
            "{}: {:.0}°C\n",
            entry.date.format("%Y-%m-%d"),
            entry.temperature
        ));
    }
    out
}

/// Текст ежедневного напоминания со сводкой текущих условий.
pub fn reminder_text(city: &str, current: &CurrentConditions) -> String {
    format!(
        "Не забудьте проверить прогноз погоды на сегодня!\n\n{}",
        current_caption(city, current)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn sample_current() -> CurrentConditions {
        CurrentConditions {
            city_label: "Москва".to_string(),
            temperature: 21.4,
            feels_like: 20.6,
            humidity: 56,
            wind_speed: 3.25,
            icon: "04d".to_string(),
        }
    }

    #[test]
    fn builds_icon_url() {
        assert_eq!(
            icon_url("04d"),
            "https://openweathermap.org/img/wn/04d@4x.png"
        );
    }

    #[test]
    fn prefers_provider_city_name() {
        let requested = Location::City("moskva".to_string());
        assert_eq!(city_label(&requested, &sample_current()), "Москва");

        let mut anonymous = sample_current();
        anonymous.city_label = String::new();
        assert_eq!(city_label(&requested, &anonymous), "moskva");
    }

    #[test]
    fn current_caption_lists_all_fields() {
        let caption = current_caption("Москва", &sample_current());
        assert_eq!(
            caption,
            "Погода в Москва\nТемпература: 21°C\nОщущается как: 21°C\nВлажность: 56%\nВетер: 3.2 м/с"
        );
    }

    #[test]
    fn hourly_text_one_line_per_slot() {
        let slots = vec![
            ForecastSlot {
                time: NaiveDateTime::parse_from_str("2026-08-05 09:00:00", "%Y-%m-%d %H:%M:%S")
                    .unwrap(),
                temperature: 18.2,
            },
            ForecastSlot {
                time: NaiveDateTime::parse_from_str("2026-08-05 12:00:00", "%Y-%m-%d %H:%M:%S")
                    .unwrap(),
                temperature: 22.7,
            },
        ];
        assert_eq!(
            hourly_text(&slots),
            "Почасовой прогноз:\n09:00 → 18°C\n12:00 → 23°C\n"
        );
    }

    #[test]
    fn weekly_text_one_line_per_day() {
        let entries = vec![DailyEntry {
            date: NaiveDate::from_ymd_opt(2026, 8, 5).unwrap(),
            temperature: 24.0,
        }];
        assert_eq!(weekly_text(&entries), "Недельный прогноз:\n2026-08-05: 24°C\n");
    }

    #[test]
    fn reminder_text_leads_with_the_nudge() {
        let text = reminder_text("Москва", &sample_current());
        assert!(text.starts_with("Не забудьте проверить прогноз погоды на сегодня!"));
        assert!(text.contains("Температура: 21°C"));
    }
}
