//! # UI Styling Module
//!
//! Button styles shared by the three panes.

use iced::widget::button;
use iced::{Background, Border, Color};

fn filled(background: Color, border: Color, border_width: f32, text: Color) -> button::Style {
    button::Style {
        background: Some(Background::Color(background)),
        text_color: text,
        border: Border {
            color: border,
            width: border_width,
            radius: 4.0.into(),
        },
        ..Default::default()
    }
}

/// Style for list rows (peripherals and characteristics) based on selection state
pub fn list_item_style(is_selected: bool) -> impl Fn(&iced::Theme, button::Status) -> button::Style {
    move |_theme: &iced::Theme, status: button::Status| {
        let width = if is_selected { 2.0 } else { 1.0 };
        match (status, is_selected) {
            // Selected rows are teal, the rest neutral gray
            (button::Status::Active, true) => filled(
                Color::from_rgb(0.2, 0.6, 0.7),
                Color::from_rgb(0.3, 0.7, 0.8),
                width,
                Color::WHITE,
            ),
            (button::Status::Active, false) => filled(
                Color::from_rgb(0.4, 0.4, 0.4),
                Color::from_rgb(0.5, 0.5, 0.5),
                width,
                Color::WHITE,
            ),
            (button::Status::Hovered, true) => filled(
                Color::from_rgb(0.3, 0.7, 0.8),
                Color::from_rgb(0.4, 0.8, 0.9),
                width,
                Color::WHITE,
            ),
            (button::Status::Hovered, false) => filled(
                Color::from_rgb(0.5, 0.5, 0.5),
                Color::from_rgb(0.6, 0.6, 0.6),
                width,
                Color::WHITE,
            ),
            (button::Status::Pressed, true) => filled(
                Color::from_rgb(0.15, 0.5, 0.6),
                Color::from_rgb(0.2, 0.6, 0.7),
                width,
                Color::WHITE,
            ),
            (button::Status::Pressed, false) => filled(
                Color::from_rgb(0.35, 0.35, 0.35),
                Color::from_rgb(0.45, 0.45, 0.45),
                width,
                Color::WHITE,
            ),
            (button::Status::Disabled, _) => filled(
                Color::from_rgb(0.3, 0.3, 0.3),
                Color::from_rgb(0.4, 0.4, 0.4),
                1.0,
                Color::from_rgb(0.6, 0.6, 0.6),
            ),
        }
    }
}

/// Style for the rescan button (green theme)
pub fn rescan_button_style() -> impl Fn(&iced::Theme, button::Status) -> button::Style {
    |_theme: &iced::Theme, status: button::Status| match status {
        button::Status::Active => filled(
            Color::from_rgb(0.2, 0.7, 0.2),
            Color::from_rgb(0.3, 0.8, 0.3),
            1.0,
            Color::WHITE,
        ),
        button::Status::Hovered => filled(
            Color::from_rgb(0.3, 0.8, 0.3),
            Color::from_rgb(0.4, 0.9, 0.4),
            1.0,
            Color::WHITE,
        ),
        button::Status::Pressed => filled(
            Color::from_rgb(0.15, 0.6, 0.15),
            Color::from_rgb(0.2, 0.7, 0.2),
            1.0,
            Color::WHITE,
        ),
        button::Status::Disabled => button::Style::default(),
    }
}

/// Style for disconnect button (red theme)
pub fn disconnect_button_style() -> impl Fn(&iced::Theme, button::Status) -> button::Style {
    |_theme: &iced::Theme, status: button::Status| match status {
        button::Status::Active => filled(
            Color::from_rgb(0.8, 0.2, 0.2),
            Color::from_rgb(0.9, 0.3, 0.3),
            1.0,
            Color::WHITE,
        ),
        button::Status::Hovered => filled(
            Color::from_rgb(0.9, 0.3, 0.3),
            Color::from_rgb(1.0, 0.4, 0.4),
            1.0,
            Color::WHITE,
        ),
        button::Status::Pressed => filled(
            Color::from_rgb(0.7, 0.15, 0.15),
            Color::from_rgb(0.8, 0.2, 0.2),
            1.0,
            Color::WHITE,
        ),
        button::Status::Disabled => button::Style::default(),
    }
}
