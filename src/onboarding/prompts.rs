//! User-facing texts for onboarding and commands.

use super::model::{BirthDetails, UserProfile};

pub const FORMAT_EXAMPLE: &str = "Date of Birth: 1990-01-15\n\
     Time of Birth: 10:30\n\
     Place of Birth: New Delhi, India";

pub fn ask_date(is_update: bool) -> String {
    let intro = if is_update {
        "✨ Let's update your birth details!"
    } else {
        "Welcome! 🌿 Let me gather your birth details so I can give you personalized cosmic guidance."
    };
    format!(
        "{intro}\n\n📅 *Step 1 of 3*\n\nWhat's your date of birth?\n\n\
         Please enter in format: YYYY-MM-DD\nExample: 1990-01-15"
    )
}

pub fn ask_time(date: &str) -> String {
    format!(
        "✅ Got it! {date}\n\n🕐 *Step 2 of 3*\n\nWhat time were you born?\n\n\
         Please enter in 24-hour format: HH:MM\nExample: 14:30 (for 2:30 PM)"
    )
}

pub fn ask_place(time: &str) -> String {
    format!(
        "✅ Perfect! {time}\n\n📍 *Step 3 of 3*\n\nWhere were you born?\n\n\
         Please enter: City, Region/State\nExample: New Delhi, India"
    )
}

pub const INVALID_DATE: &str =
    "❌ That doesn't look like a valid date. Please use YYYY-MM-DD\n\nExample: 1990-01-15";

pub const INVALID_TIME: &str =
    "❌ That doesn't look like a valid time. Please use HH:MM (24-hour format)\n\nExample: 14:30 or 09:15";

pub const INVALID_PLACE: &str = "❌ Please include both city and region/state separated by a comma.\n\n\
     Example: Mumbai, Maharashtra";

pub const CANCELLED: &str = "Cancelled! You can start again anytime with /change or /start 🌿";

pub const NOTHING_TO_CANCEL: &str = "Nothing to cancel right now 🌿";

pub const SAVE_FAILED: &str =
    "Sorry, I couldn't save your details just now. Please try again in a moment 🌿";

pub fn completed(details: &BirthDetails, is_update: bool) -> String {
    let (title, outro) = if is_update {
        (
            "✅ *Birth Details Updated!*",
            "Your cosmic profile has been refreshed! What would you like to know? 🌟",
        )
    } else {
        (
            "🎉 *All Set!*",
            "Thanks for sharing your details! What would you like to know? 🌿✨",
        )
    };
    format!(
        "{title}\n\n📅 Date of Birth: {}\n🕐 Time of Birth: {}\n📍 Place of Birth: {}\n\n{outro}",
        details.date_of_birth, details.time_of_birth, details.place_of_birth
    )
}

pub const EXTRACTED: &str =
    "Thanks for sharing your details 🌿\nWhat would you like me to look into for you today? 🌞";

pub fn request_details() -> String {
    format!("Please provide below in exact format:\n\n{FORMAT_EXAMPLE}\n\nOr type /change for a step-by-step setup.")
}

pub fn welcome(profile: &UserProfile) -> String {
    if profile.is_complete() {
        format!(
            "Hey {}! 👋 Welcome back! 🌿\n\n\
             Your cosmic profile is all set up. Ask me about today, your week, \
             career, love or anything else on your mind!\n\n\
             Need to update your details? Just type /change ✨",
            profile.display_name
        )
    } else {
        format!(
            "Hi! I'm Rudie 🌿 your friendly Vedic astrologer ✨\n\n\
             To get started I need your birth details. Type /change for a \
             step-by-step setup, or send them all at once:\n\n{FORMAT_EXAMPLE}"
        )
    }
}

pub const HELP: &str = "🌿 *How to Use Rudie*\n\n\
     Ask me about today, your week, career, love, wealth or health.\n\n\
     *Commands:*\n\
     /start - Welcome & getting started\n\
     /help - Show this help message\n\
     /info - See your birth details\n\
     /change - Update birth details (wizard)\n\
     /clear - Clear chat history\n\
     /cancel - Cancel current operation\n\n\
     Let the stars guide you! ✨";

pub fn info(profile: &UserProfile) -> String {
    if profile.is_complete() {
        format!(
            "🌟 *Your Birth Details*\n\n{}\n\nWant to update? Type /change",
            profile.summary()
        )
    } else {
        format!(
            "❌ You haven't provided your birth details yet.\n\n\
             Type /change to set them up, or send them all at once:\n\n{FORMAT_EXAMPLE}"
        )
    }
}

pub const CLEARED: &str =
    "🗑️ Your chat history, memories, and conversation data have been cleared. Starting fresh! 🌱";

pub const CLEAR_FAILED: &str =
    "Sorry, there was an error clearing your data. Please try again later.";

pub const PAUSED: &str =
    "Your access is currently paused 🌙 Please reach out to the team if you think this is a mistake.";

pub const ENQUEUE_FAILED: &str =
    "Sorry, I couldn't take your question right now 🌙 Please try again in a moment 🙏";
