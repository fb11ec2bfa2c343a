mod sync_routes;
