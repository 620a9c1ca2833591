//! Minimal server-side HTML. The markup itself is deliberately plain; the
//! interesting parts are the hidden `_csrf` fields the guard expects back.

use axum::response::Html;

use crate::profiles::dto::{DND_CLASSES, DND_RACES, EXPERIENCE_LEVELS, TIMEZONES};
use crate::profiles::repo::Profile;
use crate::users::repo::User;

pub fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn layout(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!doctype html><html><head><title>{}</title></head><body>\
         <nav><a href=\"/\">Home</a> <a href=\"/profiles/all\">Profiles</a> \
         <a href=\"/profiles/my\">My profile</a> <a href=\"/users\">Users</a></nav>\
         {body}</body></html>",
        escape(title)
    ))
}

fn error_block(error: Option<&str>) -> String {
    match error {
        Some(msg) => format!("<p class=\"error\">{}</p>", escape(msg)),
        None => String::new(),
    }
}

fn csrf_field(csrf: &str) -> String {
    format!("<input type=\"hidden\" name=\"_csrf\" value=\"{}\">", escape(csrf))
}

fn select(name: &str, options: &[&str], current: &str) -> String {
    let opts: String = options
        .iter()
        .map(|o| {
            let sel = if *o == current { " selected" } else { "" };
            format!("<option value=\"{0}\"{sel}>{0}</option>", escape(o))
        })
        .collect();
    format!("<select name=\"{name}\">{opts}</select>")
}

pub fn home() -> Html<String> {
    layout(
        "D&D Dating!",
        "<h1>D&D Dating!</h1>\
         <p><a href=\"/register\">Register</a> or <a href=\"/login\">log in</a> \
         to find your party.</p>",
    )
}

pub fn login_page(csrf: &str, error: Option<&str>) -> Html<String> {
    layout(
        "Log in",
        &format!(
            "<h1>Log in</h1>{}\
             <form method=\"post\" action=\"/login\">{}\
             <label>Username <input name=\"name\"></label>\
             <label>Password <input type=\"password\" name=\"password\"></label>\
             <button>Log in</button></form>\
             <p><a href=\"/register\">Need an account?</a></p>",
            error_block(error),
            csrf_field(csrf)
        ),
    )
}

pub fn register_page(csrf: &str, error: Option<&str>) -> Html<String> {
    layout(
        "Register",
        &format!(
            "<h1>Register</h1>{}\
             <form method=\"post\" action=\"/register\">{}\
             <label>Username <input name=\"name\"></label>\
             <label>Password <input type=\"password\" name=\"password\"></label>\
             <label>Confirm <input type=\"password\" name=\"confirm_password\"></label>\
             <button>Register</button></form>",
            error_block(error),
            csrf_field(csrf)
        ),
    )
}

pub fn users_page(users: &[User], csrf: &str) -> Html<String> {
    let rows: String = users
        .iter()
        .map(|u| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td>\
                 <td><a href=\"/users/{}/edit\">edit</a>\
                 <form method=\"post\" action=\"/users/{}/delete\">{}<button>delete</button></form>\
                 </td></tr>",
                u.user_id,
                escape(&u.name),
                if u.is_admin { "admin" } else { "" },
                u.user_id,
                u.user_id,
                csrf_field(csrf)
            )
        })
        .collect();
    layout(
        "Users",
        &format!(
            "<h1>Users</h1><table><tr><th>Id</th><th>Name</th><th></th><th></th></tr>{rows}</table>\
             <h2>Add user</h2>\
             <form method=\"post\" action=\"/users\">{}\
             <label>Username <input name=\"name\"></label>\
             <label>Password <input type=\"password\" name=\"pass\"></label>\
             <button>Create</button></form>",
            csrf_field(csrf)
        ),
    )
}

pub fn edit_user_page(user: &User, csrf: &str) -> Html<String> {
    layout(
        "Edit user",
        &format!(
            "<h1>Edit user</h1>\
             <form method=\"post\" action=\"/users/{}\">{}\
             <label>Username <input name=\"name\" value=\"{}\"></label>\
             <label>Password <input type=\"password\" name=\"pass\"></label>\
             <button>Save</button></form>",
            user.user_id,
            csrf_field(csrf),
            escape(&user.name)
        ),
    )
}

fn profile_card(p: &Profile) -> String {
    let image = p
        .image_path
        .as_deref()
        .map(|path| format!("<img src=\"{}\" alt=\"portrait\">", escape(path)))
        .unwrap_or_default();
    let bio = p.bio.as_deref().unwrap_or("");
    format!(
        "<article>{image}<h3>{}</h3>\
         <p>Level {} {} {}</p><p>{}</p>\
         <p>Looking for: {} | Experience: {} | Timezone: {}</p></article>",
        escape(&p.name),
        p.level,
        escape(&p.race),
        escape(&p.class),
        escape(bio),
        escape(&p.looking_for),
        escape(&p.experience_level),
        escape(&p.timezone),
    )
}

pub fn profiles_page(profiles: &[Profile]) -> Html<String> {
    let cards: String = profiles.iter().map(profile_card).collect();
    layout("All profiles", &format!("<h1>All profiles</h1>{cards}"))
}

/// Shared field set for the profile forms. The my-profile forms post
/// multipart with a portrait upload; the generic edit form posts plain
/// urlencoded so its hidden `_csrf` field is what the guard reads.
fn profile_form(action: &str, csrf: &str, current: Option<&Profile>, upload: bool) -> String {
    let name = current.map(|p| p.name.as_str()).unwrap_or("");
    let race = current.map(|p| p.race.as_str()).unwrap_or("");
    let class = current.map(|p| p.class.as_str()).unwrap_or("");
    let level = current.map(|p| p.level).unwrap_or(1);
    let bio = current.and_then(|p| p.bio.as_deref()).unwrap_or("");
    let looking_for = current.map(|p| p.looking_for.as_str()).unwrap_or("");
    let experience = current.map(|p| p.experience_level.as_str()).unwrap_or("beginner");
    let timezone = current.map(|p| p.timezone.as_str()).unwrap_or("UTC");
    let enctype = if upload {
        " enctype=\"multipart/form-data\""
    } else {
        ""
    };
    let portrait = if upload {
        "<label>Portrait <input type=\"file\" name=\"image\"></label>"
    } else {
        ""
    };
    format!(
        "<form method=\"post\" action=\"{action}\"{enctype}>{}\
         <label>Name <input name=\"name\" value=\"{}\"></label>\
         <label>Race {}</label>\
         <label>Class {}</label>\
         <label>Level <input name=\"level\" value=\"{level}\"></label>\
         <label>Bio <textarea name=\"bio\">{}</textarea></label>\
         <label>Looking for <input name=\"looking_for\" value=\"{}\"></label>\
         <label>Experience {}</label>\
         <label>Timezone {}</label>\
         {portrait}\
         <button>Save</button></form>",
        csrf_field(csrf),
        escape(name),
        select("race", DND_RACES, race),
        select("class", DND_CLASSES, class),
        escape(bio),
        escape(looking_for),
        select("experience_level", EXPERIENCE_LEVELS, experience),
        select("timezone", TIMEZONES, timezone),
    )
}

pub fn my_profile_page(profile: Option<&Profile>, csrf: &str, error: Option<&str>) -> Html<String> {
    let body = match profile {
        Some(p) => format!(
            "<h1>My profile</h1>{}{}\
             <h2>Update</h2>{}\
             <form method=\"post\" action=\"/profiles/my/delete\">{}<button>Delete profile</button></form>",
            error_block(error),
            profile_card(p),
            profile_form("/profiles/my/update", csrf, Some(p), true),
            csrf_field(csrf)
        ),
        None => format!(
            "<h1>Create your profile</h1>{}{}",
            error_block(error),
            profile_form("/profiles/my", csrf, None, true)
        ),
    };
    layout("My profile", &body)
}

pub fn edit_profile_page(profile: &Profile, csrf: &str) -> Html<String> {
    layout(
        "Edit profile",
        &format!(
            "<h1>Edit profile</h1>{}",
            profile_form(
                &format!("/profiles/{}", profile.profile_id),
                csrf,
                Some(profile),
                false
            )
        ),
    )
}

pub struct AdminStats {
    pub total_users: i64,
    pub total_profiles: i64,
    pub app_uptime_secs: u64,
    pub uptime_out: String,
    pub log_tail: String,
}

pub fn admin_page(stats: &AdminStats) -> Html<String> {
    layout(
        "Admin",
        &format!(
            "<h1>Admin</h1>\
             <p>Users: {} | Profiles: {} | App uptime: {}s</p>\
             <pre>{}</pre>\
             <h2>Log</h2><pre>{}</pre>\
             <form method=\"post\" action=\"/admin/log\">\
             <label>Note <input name=\"message\"></label>\
             <button>Append</button></form>",
            stats.total_users,
            stats.total_profiles,
            stats.app_uptime_secs,
            escape(&stats.uptime_out),
            escape(&stats.log_tail),
        ),
    )
}
