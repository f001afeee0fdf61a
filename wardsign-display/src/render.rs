//! Text frames for the signage screen
//!
//! Pure presentation: a frame is built from the current view, the latest
//! snapshot and the session banners. Empty sections show a "no data" line
//! rather than an error. Active emergency alerts add a corner banner on
//! every view but never switch the view.

use crate::model::{AlertPriority, DisplayConfig, HospitalSnapshot, ViewId};
use chrono::{DateTime, Local};
use std::fmt::Write;

const EDUCATION_TIPS: &[(&str, &str)] = &[
    ("hygiene", "Wash your hands for at least 20 seconds before and after visiting patients."),
    ("hygiene", "Use the sanitiser stations at every ward entrance."),
    ("vaccination", "Adult vaccination clinic: Tuesdays and Thursdays, OPD Block room 12."),
    ("nutrition", "Five portions of fruit and vegetables a day support faster recovery."),
    ("heart", "Chest pain lasting more than 5 minutes? Go straight to the Emergency department."),
    ("diabetes", "Free blood sugar screening at the pharmacy counter every morning."),
];

pub struct RenderContext<'a> {
    pub location: &'a str,
    pub view: ViewId,
    pub position: (usize, usize),
    pub pinned: bool,
    pub snapshot: &'a HospitalSnapshot,
    pub config: Option<&'a DisplayConfig>,
    pub heartbeat_banner: Option<&'a str>,
    pub hidden: bool,
    pub now: DateTime<Local>,
}

pub fn render(ctx: &RenderContext<'_>) -> String {
    let mut out = String::new();
    let (index, total) = ctx.position;
    let pin = if ctx.pinned { " [pinned]" } else { "" };
    let _ = writeln!(
        out,
        "{} | {} ({}/{}){} | {}",
        if ctx.location.is_empty() { "WardSign" } else { ctx.location },
        ctx.view.title(),
        index + 1,
        total,
        pin,
        ctx.now.format("%H:%M:%S")
    );

    if ctx.hidden {
        let _ = writeln!(out, "[offline] display hidden, liveness suspended");
    }
    if let Some(banner) = ctx.heartbeat_banner {
        let _ = writeln!(out, "[status] {banner}");
    }
    if let Some(alert) = ctx
        .snapshot
        .active_alerts()
        .max_by_key(|a| a.priority)
    {
        let count = ctx.snapshot.active_alerts().count();
        let _ = writeln!(out, "[!] {} - {} ({} active)", alert.code_type, alert.location, count);
    }
    out.push_str(&"-".repeat(60));
    out.push('\n');

    match ctx.view {
        ViewId::Overview => overview(&mut out, ctx.snapshot),
        ViewId::Queue => queue(&mut out, ctx.snapshot, ctx.config),
        ViewId::Ot => theatres(&mut out, ctx.snapshot, ctx.config),
        ViewId::Emergency => emergency(&mut out, ctx.snapshot, ctx.config),
        ViewId::Inventory => inventory(&mut out, ctx.snapshot, ctx.config),
        ViewId::Departments => departments(&mut out, ctx.snapshot, ctx.config),
        ViewId::Education => education(&mut out, ctx.config),
    }
    out
}

fn no_data(out: &mut String) {
    out.push_str("  No data available\n");
}

fn overview(out: &mut String, s: &HospitalSnapshot) {
    let waiting = s.token_queue.iter().filter(|t| t.is_waiting()).count();
    let (beds, occupied) = s
        .departments
        .iter()
        .fold((0u64, 0u64), |(b, o), d| {
            (b + u64::from(d.total_beds), o + u64::from(d.occupied_beds.min(d.total_beds)))
        });
    let theatres_free = s.ot_status.iter().filter(|r| r.status == "available").count();
    let low_blood: Vec<&str> = s.blood_bank.iter().filter(|b| b.is_low()).map(|b| b.blood_type.as_str()).collect();

    let _ = writeln!(out, "  Patients waiting   : {waiting}");
    let _ = writeln!(out, "  Beds occupied      : {occupied}/{beds}");
    let _ = writeln!(out, "  Theatres available : {}/{}", theatres_free, s.ot_status.len());
    let _ = writeln!(out, "  Active alerts      : {}", s.active_alerts().count());
    let _ = writeln!(out, "  Low-stock drugs    : {}", s.low_stock().count());
    if !low_blood.is_empty() {
        let _ = writeln!(out, "  Blood needed       : {}", low_blood.join(", "));
    }
}

fn queue(out: &mut String, s: &HospitalSnapshot, config: Option<&DisplayConfig>) {
    let counters = match config {
        Some(DisplayConfig::TokenQueue { counters }) if !counters.is_empty() => Some(counters),
        _ => None,
    };
    let entries: Vec<_> = s
        .token_queue
        .iter()
        .filter(|t| t.is_serving() || t.is_waiting())
        .filter(|t| counters.map_or(true, |c| c.contains(&t.counter)))
        .collect();
    if entries.is_empty() {
        return no_data(out);
    }
    for t in entries {
        let state = if t.is_serving() { "NOW SERVING".to_string() } else { format!("~{} min", t.estimated_wait) };
        let _ = writeln!(out, "  {:<8} {:<18} {:<6} {}", t.token_number, t.department, t.counter, state);
    }
}

fn theatres(out: &mut String, s: &HospitalSnapshot, config: Option<&DisplayConfig>) {
    let only = match config {
        Some(DisplayConfig::OtStatus { theatres }) if !theatres.is_empty() => Some(theatres),
        _ => None,
    };
    let rooms: Vec<_> = s.ot_status.iter().filter(|r| only.map_or(true, |o| o.contains(&r.ot_id))).collect();
    if rooms.is_empty() {
        return no_data(out);
    }
    for r in rooms {
        let _ = write!(out, "  {:<6} {:<12}", r.ot_id, r.status.replace('_', " "));
        if !r.current_procedure.is_empty() {
            let _ = write!(out, " {} ({})", r.current_procedure, r.surgeon);
        }
        if !r.estimated_end.is_empty() {
            let _ = write!(out, " until {}", r.estimated_end);
        }
        out.push('\n');
    }
}

fn emergency(out: &mut String, s: &HospitalSnapshot, config: Option<&DisplayConfig>) {
    let min = match config {
        Some(DisplayConfig::EmergencyAlerts { min_priority: Some(p) }) => *p,
        _ => AlertPriority::Low,
    };
    let mut alerts: Vec<_> = s.active_alerts().filter(|a| a.priority >= min).collect();
    if alerts.is_empty() {
        out.push_str("  No active emergencies\n");
        return;
    }
    alerts.sort_by(|a, b| b.priority.cmp(&a.priority));
    for a in alerts {
        let _ = writeln!(out, "  [{:?}] {} @ {}: {}", a.priority, a.code_type, a.location, a.message);
    }
}

fn inventory(out: &mut String, s: &HospitalSnapshot, config: Option<&DisplayConfig>) {
    let low_only = matches!(config, Some(DisplayConfig::DrugInventory { low_stock_only: true }));
    let items: Vec<_> = s.drug_inventory.iter().filter(|d| !low_only || d.is_low()).collect();
    if items.is_empty() && s.blood_bank.is_empty() {
        return no_data(out);
    }
    for d in items {
        let flag = if d.is_low() { " LOW" } else { "" };
        let _ = writeln!(out, "  {:<20} {:>5}/{:<5} {}{}", d.drug_name, d.current_stock, d.min_stock, d.unit, flag);
    }
    if !s.blood_bank.is_empty() {
        out.push_str("  Blood bank:");
        for b in &s.blood_bank {
            let _ = write!(out, " {}={}{}", b.blood_type, b.units_available, if b.is_low() { "!" } else { "" });
        }
        out.push('\n');
    }
}

fn departments(out: &mut String, s: &HospitalSnapshot, config: Option<&DisplayConfig>) {
    let only = match config {
        Some(DisplayConfig::DepartmentStatus { departments }) if !departments.is_empty() => Some(departments),
        _ => None,
    };
    let depts: Vec<_> = s.departments.iter().filter(|d| only.map_or(true, |o| o.contains(&d.name))).collect();
    if depts.is_empty() {
        return no_data(out);
    }
    for d in depts {
        let _ = writeln!(
            out,
            "  {:<18} {:>3}/{:<3} beds {:>3}% {}",
            d.name,
            d.occupied_beds,
            d.total_beds,
            d.occupancy_percent(),
            d.status
        );
    }
}

fn education(out: &mut String, config: Option<&DisplayConfig>) {
    let topics = match config {
        Some(DisplayConfig::HealthEducation { topics }) if !topics.is_empty() => Some(topics),
        _ => None,
    };
    let tips: Vec<_> = EDUCATION_TIPS
        .iter()
        .filter(|(topic, _)| topics.map_or(true, |t| t.iter().any(|x| x == *topic)))
        .collect();
    if tips.is_empty() {
        return no_data(out);
    }
    for (_, tip) in tips {
        let _ = writeln!(out, "  * {tip}");
    }
}
