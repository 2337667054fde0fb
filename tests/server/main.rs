
mod client_auth;
mod dtls;
mod faults;
mod full;
mod resume;
