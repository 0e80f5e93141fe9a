use axum::{
    Router, middleware,
    routing::{delete, get, post, put},
};

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod s3;

use config::AppState;

/// Builds the portal router. Everything except the ping and login routes
/// sits behind bearer-token auth.
pub fn app(app_state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/users",
            post(routes::users::post_user).get(routes::users::get_users),
        )
        .route(
            "/centres",
            post(routes::centres::post_centre).get(routes::centres::get_centres),
        )
        .route(
            "/centres/{id}",
            get(routes::centres::get_centre)
                .put(routes::centres::put_centre)
                .delete(routes::centres::delete_centre),
        )
        .route(
            "/subjects",
            post(routes::subjects::post_subject).get(routes::subjects::get_subjects),
        )
        .route(
            "/subjects/{id}",
            get(routes::subjects::get_subject)
                .put(routes::subjects::put_subject)
                .delete(routes::subjects::delete_subject),
        )
        .route(
            "/teachers",
            post(routes::teachers::post_teacher).get(routes::teachers::get_teachers),
        )
        .route(
            "/teachers/{id}",
            get(routes::teachers::get_teacher)
                .put(routes::teachers::put_teacher)
                .delete(routes::teachers::delete_teacher),
        )
        .route(
            "/students",
            post(routes::students::post_student).get(routes::students::get_students),
        )
        .route(
            "/students/import",
            post(routes::students::post_students_import),
        )
        .route(
            "/students/export",
            get(routes::students::get_students_export),
        )
        .route(
            "/students/{id}",
            get(routes::students::get_student)
                .put(routes::students::put_student)
                .delete(routes::students::delete_student),
        )
        .route(
            "/students/{id}/photo",
            post(routes::students::post_student_photo),
        )
        .route(
            "/exams",
            post(routes::exams::post_exam).get(routes::exams::get_exams),
        )
        .route(
            "/exams/{id}",
            get(routes::exams::get_exam)
                .put(routes::exams::put_exam)
                .delete(routes::exams::delete_exam),
        )
        .route(
            "/marks/cce",
            put(routes::marks::put_cce_marks).get(routes::marks::get_cce_marks),
        )
        .route(
            "/marks/sa",
            put(routes::marks::put_sa_marks).get(routes::marks::get_sa_marks),
        )
        .route(
            "/results/{examId}/students/{studentId}",
            get(routes::results::get_marksheet),
        )
        .route(
            "/results/{examId}/centres/{centreId}",
            get(routes::results::get_centre_tabulation),
        )
        .route(
            "/hall-tickets/{examId}/students/{studentId}",
            get(routes::hall_tickets::get_hall_ticket),
        )
        .route(
            "/hall-tickets/{examId}/centres/{centreId}",
            get(routes::hall_tickets::get_centre_hall_tickets),
        )
        .route(
            "/messages",
            post(routes::messages::post_message).get(routes::messages::get_messages),
        )
        .route("/messages/{id}", delete(routes::messages::delete_message))
        .route(
            "/supplementary/{examId}/eligible",
            get(routes::supplementary::get_eligible),
        )
        .route(
            "/supplementary/register",
            post(routes::supplementary::post_registration),
        )
        .route(
            "/supplementary/{examId}/export",
            get(routes::supplementary::get_registrations_export),
        )
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            auth::require_auth,
        ));

    Router::new()
        .route("/status/ping", get(routes::get_status_ping))
        .route("/auth/login", post(routes::auth::post_login))
        .merge(protected)
        .with_state(app_state)
}
