//! Telegram MarkdownV2 rendering of listing notifications.

use minijinja::Environment;
use minijinja::context;

use crate::entity::Listing;

const TEMPLATE_NAME: &str = "listing";
const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const GREETING: &str = "👋 Hi, here's a new listing for your subscription.";

const LISTING_TEMPLATE: &str = "{{ greeting | md }}

📝 *Title:* {{ title | md }}
💰 *Price:* {{ price | md }}
🏎️ *Engine Volume:* {{ engine_volume | md }}
⚙️ *Transmission:* {{ transmission | md }}
🚗 *Body Type:* {{ body_type | md }}
🧭 *Mileage:* {{ mileage | md }}
📍 *Location:* {{ location | md }}
📅 *Date:* {{ date | md }}
🌐 *Link:* [tap to link]({{ link | md_url }})";

/// Characters that must be escaped anywhere in MarkdownV2 text.
const MARKDOWN_V2_SPECIAL: &[char] = &[
    '\\', '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.',
    '!',
];

pub struct MessageRenderer {
    env: Environment<'static>,
}

impl MessageRenderer {
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.add_filter("md", escape_markdown);
        env.add_filter("md_url", escape_link_target);
        env.add_template(TEMPLATE_NAME, LISTING_TEMPLATE)?;
        Ok(Self { env })
    }

    /// Renders the notification text for a pending listing.
    pub fn render(&self, listing: &Listing) -> Result<String, minijinja::Error> {
        let template = self.env.get_template(TEMPLATE_NAME)?;
        template.render(context! {
            greeting => GREETING,
            title => &listing.title,
            price => display_price(listing),
            engine_volume => &listing.engine_volume,
            transmission => &listing.transmission,
            body_type => &listing.body_type,
            mileage => &listing.mileage,
            location => &listing.location,
            date => listing
                .date
                .map(|d| d.format(DATE_FORMAT).to_string())
                .unwrap_or_default(),
            link => &listing.link,
        })
    }
}

/// Price line; shows `⚠old🔺new` or `⚠old🔻new` while a price change is pending.
pub fn display_price(listing: &Listing) -> String {
    match listing.new_price.as_deref() {
        Some(new_price) if new_price != listing.price => {
            let direction = match (price_value(&listing.price), price_value(new_price)) {
                (Some(old), Some(new)) if new < old => "🔻",
                _ => "🔺",
            };
            format!("⚠{}{}{}", listing.price, direction, new_price)
        }
        _ => listing.price.clone(),
    }
}

/// Numeric value of a display price such as `"12.500 €"`.
fn price_value(price: &str) -> Option<u64> {
    let digits: String = price.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

pub fn escape_markdown(value: String) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if MARKDOWN_V2_SPECIAL.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Inside `(...)` of an inline link only `)` and `\` are escaped.
fn escape_link_target(value: String) -> String {
    value.replace('\\', "\\\\").replace(')', "\\)")
}
