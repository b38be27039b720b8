use crate::data::user::User;
use maud::{Markup, Render, html};
use secrecy::{ExposeSecret, SecretString};

pub const INPUT_CLASSES: &str = "shadow appearance-none border rounded w-full py-2 px-3 leading-tight focus:outline-none focus:shadow-outline bg-gray-700 border-gray-600";

pub fn table<const N: usize>(
    caption: Option<Markup>,
    titles: [&'static str; N],
    items: Vec<[impl Render; N]>,
) -> Markup {
    html! {
        @if let Some(caption) = caption {
            (caption)
        }
        div class="overflow-x-auto" {
            table class="min-w-full bg-gray-800 rounded shadow-md" {
                thead class="bg-gray-700" {
                    tr {
                        @for title in titles {
                            th class="py-2 px-4 text-left font-semibold text-gray-300" {(title)}
                        }
                    }
                }
                tbody {
                    @if items.is_empty() {
                        tr {
                            td colspan=(N) class="py-2 px-4 text-center italic text-gray-400" {"Nothing here yet."}
                        }
                    }
                    @for row in items {
                        tr {
                            @for col in row {
                                td class="py-2 px-4 border-b border-gray-600 text-gray-200" {(col)}
                            }
                        }
                    }
                }
            }
        }
    }
}

pub fn supertitle(s: impl Render) -> Markup {
    html! {
        h1 class="text-3xl font-bold mb-6 text-center" {(s)}
    }
}

pub fn title(s: impl Render) -> Markup {
    html! {
        h1 class="text-2xl font-semibold mb-4" {(s)}
    }
}

pub fn subtitle(s: impl Render) -> Markup {
    html! {
        h2 class="text-xl font-semibold mb-2" {(s)}
    }
}

pub fn subsubtitle(s: impl Render) -> Markup {
    html! {
        h3 class="text-lg font-semibold mb-2 text-gray-300" {(s)}
    }
}

pub fn form_element(id: &str, label: &str, input: Markup) -> Markup {
    html! {
        div class="mb-4" {
            label for=(id) class="block text-sm font-bold mb-2 text-gray-300" {(label)}
            (input)
        }
    }
}

pub fn simple_form_element(
    id: &str,
    label: &str,
    required: bool,
    input_type: Option<&str>,
    value: Option<&str>,
) -> Markup {
    form_element(
        id,
        label,
        html! {
            input required[required] id=(id) name=(id) type=(input_type.unwrap_or("text")) value=[value] class=(INPUT_CLASSES);
        },
    )
}

///shown instead of an input when a value must not change after creation
pub fn read_only_form_element(id: &str, label: &str, value: &str) -> Markup {
    form_element(
        id,
        label,
        html! {
            input readonly id=(id) name=(id) type="text" value=(value) class={(INPUT_CLASSES) " opacity-60 cursor-not-allowed"};
        },
    )
}

pub fn select_form_element<'a>(
    id: &str,
    label: &str,
    placeholder: &str,
    options: impl IntoIterator<Item = (&'a str, &'a str)>,
    selected: Option<&str>,
) -> Markup {
    form_element(
        id,
        label,
        html! {
            select id=(id) name=(id) class=(INPUT_CLASSES) {
                option value="" {(placeholder)}
                @for (value, text) in options {
                    option value=(value) selected[selected == Some(value)] {(text)}
                }
            }
        },
    )
}

///a set of checkboxes that all submit under `name`, optionally re-posting the form on every change
pub fn checkbox_group<'a>(
    name: &str,
    label: &str,
    options: impl IntoIterator<Item = &'a str>,
    checked: &[String],
    refresh: Option<(&str, &str)>,
) -> Markup {
    let options: Vec<(String, &str, bool)> = options
        .into_iter()
        .map(|option| {
            let is_checked = checked.iter().any(|c| c.eq_ignore_ascii_case(option));
            (format!("{name}_{option}"), option, is_checked)
        })
        .collect();

    html! {
        fieldset class="mb-4" {
            legend class="block text-sm font-bold mb-2 text-gray-300" {(label)}
            @if options.is_empty() {
                p class="italic text-gray-400 text-sm" {"Nothing to choose from yet."}
            }
            div class="flex flex-wrap gap-x-4 gap-y-2" {
                @for (id, option, is_checked) in options {
                    label for=(id) class="flex items-center text-gray-300 cursor-pointer" {
                        @if let Some((url, target)) = refresh {
                            input type="checkbox" id=(id) name=(name) value=(option) checked[is_checked] class="mr-2 leading-tight" hx-post=(url) hx-trigger="change" hx-target=(target) hx-include="closest form";
                        } @else {
                            input type="checkbox" id=(id) name=(name) value=(option) checked[is_checked] class="mr-2 leading-tight";
                        }
                        (option)
                    }
                }
            }
        }
    }
}

pub fn generate_password_checkbox() -> Markup {
    html! {
        div class="mb-4 flex items-center" {
            input type="checkbox" name="generate_password" id="generate_password" class="mr-2 leading-tight";
            label for="generate_password" class="text-gray-300 cursor-pointer" {"Auto-Generate Password?"}
        }
    }
}

pub fn form_submit_button(text: Option<&str>) -> Markup {
    html! {
        div class="flex items-center justify-between" {
            button type="submit" class="bg-blue-500 hover:bg-blue-700 font-bold py-2 px-4 rounded focus:outline-none focus:shadow-outline" {
                (text.unwrap_or("Submit"))
            }
        }
    }
}

pub fn errors_list(
    heading: Option<&str>,
    errors: impl Iterator<Item = impl Render>,
) -> Markup {
    html! {
        div role="alert" class="bg-red-100 border border-red-400 text-red-700 px-4 py-3 rounded relative mb-4" {
            strong class="font-bold" {(heading.unwrap_or("Please fix the following:"))}
            ul class="list-disc list-inside" {
                @for error in errors {
                    li {(error)}
                }
            }
        }
    }
}

pub fn success_message(message: impl Render) -> Markup {
    html! {
        div role="status" class="bg-green-100 border border-green-400 text-green-800 px-4 py-3 rounded relative mb-4" {
            (message)
        }
    }
}

///one-time display of a freshly generated password
pub fn default_password_notice(identifier: &str, password: &SecretString) -> Markup {
    html! {
        div class="py-4" {
            p class="text-gray-200 font-semibold" {
                "Default Password for " (identifier) " (not shown again): "
                span class="font-mono font-medium" {(password.expose_secret())}
            }
        }
    }
}

pub fn detail_row(label: &str, value: impl Render) -> Markup {
    html! {
        p class="text-gray-200 font-semibold" {
            (label) ": "
            span class="font-medium" {(value)}
        }
    }
}

pub fn stat_card(label: &str, value: impl Render) -> Markup {
    html! {
        div class="rounded-lg shadow-md p-4 text-center bg-gray-700" {
            p class="text-sm text-gray-400" {(label)}
            p class="text-2xl font-bold" {(value)}
        }
    }
}

///tab strip of plain links, highlighting the current one
pub fn tabs(active: &str, tabs: &[(&str, &str)]) -> Markup {
    let tabs = tabs.iter().map(|(label, href)| {
        let colours = if *label == active {
            "bg-gray-700 text-white"
        } else {
            "text-gray-300 hover:bg-gray-700"
        };
        (*label, *href, colours)
    });

    html! {
        div class="flex flex-row flex-wrap gap-2 mb-4 border-b border-gray-700 pb-2" {
            @for (label, href, colours) in tabs {
                a href=(href) class={"px-3 py-2 rounded-md text-sm font-medium " (colours)} {
                    (label)
                }
            }
        }
    }
}

pub struct Email<'a>(pub &'a str);

impl Render for Email<'_> {
    fn render(&self) -> Markup {
        html! {
            a href={"mailto:" (self.0)} class="text-blue-300 hover:underline" {(self.0)}
        }
    }
}

pub fn render_notifications() -> Markup {
    html! {
        div id="notifications" class="w-full max-w-4xl px-4" {}
    }
}

pub fn render_nav(user: Option<&User>) -> Markup {
    let link_classes = "text-gray-300 hover:bg-gray-700 hover:text-white px-3 py-2 rounded-md text-sm font-medium";

    html! {
        nav class="bg-gray-800 w-full shadow-md" {
            div class="max-w-7xl mx-auto px-4 flex items-center justify-between h-16" {
                a href="/" class="text-xl font-bold" {"Schoolyard"}
                div class="flex items-baseline space-x-4" {
                    a href="/" class=(link_classes) {"Home"}
                    @if let Some(user) = user {
                        a href=(user.role().dashboard()) class=(link_classes) {"Dashboard"}
                        a href="/change_password" class=(link_classes) {"Change Password"}
                        span class="text-gray-400 text-sm" {(user)}
                        form method="post" action="/logout" class="inline" {
                            button type="submit" class="bg-red-700 hover:bg-red-800 px-3 py-2 rounded-md text-sm font-medium" {"Logout"}
                        }
                    } @else {
                        a href="/login" class=(link_classes) {"Login"}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_element_marks_required_inputs() {
        let markup = simple_form_element("email", "Email", true, Some("email"), None).into_string();
        assert!(markup.contains(r#"type="email""#));
        assert!(markup.contains("required"));
        assert!(markup.contains(r#"for="email""#));

        let optional = simple_form_element("phone", "Phone", false, None, Some("123")).into_string();
        assert!(!optional.contains("required"));
        assert!(optional.contains(r#"value="123""#));
        assert!(optional.contains(r#"type="text""#));
    }

    #[test]
    fn checkboxes_remember_selection_case_insensitively() {
        let markup = checkbox_group(
            "sections",
            "Sections",
            ["A", "B", "NEEV"],
            &["neev".to_string()],
            None,
        )
        .into_string();

        assert_eq!(markup.matches("checked").count(), 1);
        assert!(markup.contains(r#"id="sections_NEEV""#));
        assert!(markup.contains(r#"value="B""#));
    }

    #[test]
    fn errors_are_listed_and_escaped() {
        let markup =
            errors_list(Some("Oops"), ["<b>bad</b>", "worse"].into_iter()).into_string();
        assert!(markup.contains("Oops"));
        assert!(markup.contains("&lt;b&gt;bad&lt;/b&gt;"));
        assert_eq!(markup.matches("<li>").count(), 2);
    }

    #[test]
    fn empty_tables_say_so() {
        let markup = table(None, ["Name", "Class"], Vec::<[&str; 2]>::new()).into_string();
        assert!(markup.contains("Nothing here yet."));
        assert!(markup.contains(r#"colspan="2""#));
    }

    #[test]
    fn selects_mark_the_current_value() {
        let markup = select_form_element(
            "section",
            "Section",
            "Select a section",
            [("A", "A"), ("B", "B")],
            Some("B"),
        )
        .into_string();
        assert_eq!(markup.matches("selected").count(), 1);
        assert!(markup.contains(r#"<option value="B" selected>B</option>"#));
    }

    #[test]
    fn email_renders_as_a_mailto_link() {
        let markup = Email("head@example.org").render().into_string();
        assert!(markup.contains(r#"href="mailto:head@example.org""#));
    }
}
